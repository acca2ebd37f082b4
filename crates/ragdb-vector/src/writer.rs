use anyhow::{bail, Context, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_array::types::Float32Type;
use lancedb::{Connection, Table};
use std::sync::Arc;

use ragdb_core::types::{Chunk, DocumentId, Node, Workspace, WorkspaceId};

use crate::filter;
use crate::schema::{build_chunks_schema, build_nodes_schema, build_workspaces_schema, ID, WORKSPACE_ID};
use crate::store::LanceStore;
use crate::table::{ensure_table, open_db, TableNames};

const BATCH_ROWS: usize = 1000;

/// Write side of the LanceDB corpus. Rows are keyed by `(workspace_id, id)`.
pub struct LanceWriter {
	db: Connection,
	tables: TableNames,
	dim: usize,
}

impl LanceWriter {
	pub async fn open(uri: &str, tables: TableNames, dim: usize) -> Result<Self> {
		Ok(Self { db: open_db(uri).await?, tables, dim })
	}

	pub fn for_store(store: &LanceStore, dim: usize) -> Self {
		Self { db: store.connection().clone(), tables: store.tables().clone(), dim }
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	fn dim_i32(&self) -> Result<i32> {
		i32::try_from(self.dim).context("embedding dimension does not fit the vector column")
	}

	pub async fn upsert_workspace(&self, workspace: &Workspace) -> Result<()> {
		let schema = build_workspaces_schema();
		let table = ensure_table(&self.db, &self.tables.workspaces, schema.clone()).await?;
		let batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(vec![workspace.id.as_str().to_string()])),
			Arc::new(StringArray::from(vec![workspace.language_tag.clone()])),
		])?;
		merge(&table, &[ID], batch).await
	}

	/// Upserts chunks; embeddings must match the writer's dimension.
	pub async fn write_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
		if chunks.is_empty() {
			return Ok(0);
		}
		self.check_dims(chunks.iter().map(|c| (c.id.as_str(), c.embedding.len())))?;
		let schema = build_chunks_schema(self.dim_i32()?);
		let table = ensure_table(&self.db, &self.tables.chunks, schema.clone()).await?;
		for batch in chunks.chunks(BATCH_ROWS) {
			let record_batch = RecordBatch::try_new(schema.clone(), vec![
				Arc::new(StringArray::from(batch.iter().map(|c| c.id.clone()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(batch.iter().map(|c| c.workspace_id.as_str().to_string()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(batch.iter().map(|c| c.document_id.clone()).collect::<Vec<_>>())),
				Arc::new(Int32Array::from(batch.iter().map(|c| to_i32(c.chunk_index)).collect::<Result<Vec<_>>>()?)),
				Arc::new(StringArray::from(batch.iter().map(|c| c.content.clone()).collect::<Vec<_>>())),
				Arc::new(self.vector_array(batch.iter().map(|c| &c.embedding))?),
			])?;
			merge(&table, &[WORKSPACE_ID, ID], record_batch).await?;
		}
		tracing::debug!(chunks = chunks.len(), table = %self.tables.chunks, "wrote chunks");
		Ok(chunks.len())
	}

	/// Replaces every node of `documents` in `workspace` with `nodes`.
	pub async fn replace_nodes(&self, workspace: &WorkspaceId, documents: &[DocumentId], nodes: &[Node]) -> Result<usize> {
		if let Some(stray) = nodes.iter().find(|n| n.workspace_id != *workspace || !documents.contains(&n.document_id)) {
			bail!("node {} is outside the documents being replaced", stray.id);
		}
		self.check_dims(nodes.iter().map(|n| (n.id.as_str(), n.embedding.len())))?;
		let schema = build_nodes_schema(self.dim_i32()?);
		let table = ensure_table(&self.db, &self.tables.nodes, schema.clone()).await?;
		if !documents.is_empty() {
			table.delete(&filter::documents_in(workspace, documents)).await?;
		}
		for batch in nodes.chunks(BATCH_ROWS) {
			let record_batch = RecordBatch::try_new(schema.clone(), vec![
				Arc::new(StringArray::from(batch.iter().map(|n| n.id.clone()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(batch.iter().map(|n| n.workspace_id.as_str().to_string()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(batch.iter().map(|n| n.document_id.clone()).collect::<Vec<_>>())),
				Arc::new(Int32Array::from(batch.iter().map(|n| to_i32(n.node_index)).collect::<Result<Vec<_>>>()?)),
				Arc::new(Int32Array::from(batch.iter().map(|n| to_i32(n.span.start)).collect::<Result<Vec<_>>>()?)),
				Arc::new(Int32Array::from(batch.iter().map(|n| to_i32(n.span.end)).collect::<Result<Vec<_>>>()?)),
				Arc::new(StringArray::from(batch.iter().map(|n| n.text.clone()).collect::<Vec<_>>())),
				Arc::new(self.vector_array(batch.iter().map(|n| &n.embedding))?),
			])?;
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema.clone()));
			table.add(reader).execute().await?;
		}
		Ok(nodes.len())
	}

	fn check_dims<'a>(&self, rows: impl Iterator<Item = (&'a str, usize)>) -> Result<()> {
		for (id, len) in rows {
			if len != self.dim {
				bail!("row {id}: embedding has {len} dimensions, expected {}", self.dim);
			}
		}
		Ok(())
	}

	fn vector_array<'a>(&self, vectors: impl Iterator<Item = &'a Vec<f32>>) -> Result<FixedSizeListArray> {
		let values: Vec<Option<Vec<Option<f32>>>> = vectors.map(|v| Some(v.iter().copied().map(Some).collect())).collect();
		Ok(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, self.dim_i32()?))
	}
}

fn to_i32(value: usize) -> Result<i32> {
	i32::try_from(value).with_context(|| format!("index {value} exceeds the Int32 column range"))
}

async fn merge(table: &Table, keys: &[&str], batch: RecordBatch) -> Result<()> {
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	let mut mi = table.merge_insert(keys);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	mi.execute(reader).await?;
	Ok(())
}
