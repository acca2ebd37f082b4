//! LanceDB connection and table helpers.
use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use ragdb_core::config::DataSettings;

/// Table names for one corpus, taken from the `[data]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
	pub chunks: String,
	pub nodes: String,
	pub workspaces: String,
}

impl Default for TableNames {
	fn default() -> Self {
		Self::from(&DataSettings::default())
	}
}

impl From<&DataSettings> for TableNames {
	fn from(data: &DataSettings) -> Self {
		Self {
			chunks: data.chunks_table.clone(),
			nodes: data.nodes_table.clone(),
			workspaces: data.workspaces_table.clone(),
		}
	}
}

pub async fn open_db(uri: &str) -> Result<Connection> {
	Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> lancedb::Result<bool> {
	Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

/// Opens `name`, or `None` when it has not been created yet.
pub async fn open_if_exists(conn: &Connection, name: &str) -> lancedb::Result<Option<Table>> {
	if !table_exists(conn, name).await? {
		return Ok(None);
	}
	Ok(Some(conn.open_table(name).execute().await?))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<Table> {
	if let Some(table) = open_if_exists(conn, name).await? {
		return Ok(table);
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
	Ok(conn.create_table(name, Box::new(iter)).execute().await?)
}
