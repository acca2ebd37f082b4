//! Read side of the LanceDB corpus: workspaces, chunks and nodes.
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::fmt::Display;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::CorpusStore;
use ragdb_core::types::{Channel, Chunk, ChunkId, ChunkSpan, Node, NodeId, SpanFilter, Workspace, WorkspaceId};

use crate::filter;
use crate::schema::{CHUNK_INDEX, CONTENT, DISTANCE, DOCUMENT_ID, ID, LANGUAGE, NODE_INDEX, SPAN_END, SPAN_START, TEXT, VECTOR, WORKSPACE_ID};
use crate::table::{open_db, open_if_exists, TableNames};

/// Backend failures surface as the dense channel being unavailable.
pub(crate) fn unavailable(e: impl Display) -> Error {
	Error::unavailable(Channel::Dense, e)
}

/// LanceDB-backed [`CorpusStore`] and [`ragdb_core::traits::VectorIndex`].
#[derive(Clone)]
pub struct LanceStore {
	pub(crate) db: Connection,
	pub(crate) tables: TableNames,
}

impl LanceStore {
	pub async fn open(uri: &str, tables: TableNames) -> anyhow::Result<Self> {
		Ok(Self { db: open_db(uri).await?, tables })
	}

	pub fn connection(&self) -> &Connection {
		&self.db
	}

	pub fn tables(&self) -> &TableNames {
		&self.tables
	}

	pub(crate) async fn table(&self, name: &str) -> Result<Option<Table>> {
		open_if_exists(&self.db, name).await.map_err(unavailable)
	}

	/// All rows of `table` matching `predicate`; a missing table yields none.
	pub(crate) async fn scan(&self, table: &str, predicate: String) -> Result<Vec<RecordBatch>> {
		let Some(table) = self.table(table).await? else { return Ok(Vec::new()) };
		let stream = table.query().only_if(predicate).execute().await.map_err(unavailable)?;
		stream.try_collect().await.map_err(unavailable)
	}

	/// Every chunk of a workspace, ordered by document then chunk index.
	pub async fn chunks_for_workspace(&self, ws: &WorkspaceId) -> Result<Vec<Chunk>> {
		let mut chunks = decode_all(self.scan(&self.tables.chunks, filter::workspace(ws)).await?, chunks_from_batch)?;
		chunks.sort_by(|a, b| a.document_id.cmp(&b.document_id).then(a.chunk_index.cmp(&b.chunk_index)));
		Ok(chunks)
	}

	pub async fn workspaces(&self) -> Result<Vec<Workspace>> {
		let Some(table) = self.table(&self.tables.workspaces).await? else { return Ok(Vec::new()) };
		let stream = table.query().execute().await.map_err(unavailable)?;
		let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(unavailable)?;
		decode_all(batches, workspaces_from_batch)
	}
}

#[async_trait]
impl CorpusStore for LanceStore {
	async fn workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
		let predicate = format!("{ID} = {}", filter::quote(id.as_str()));
		let found = decode_all(self.scan(&self.tables.workspaces, predicate).await?, workspaces_from_batch)?;
		Ok(found.into_iter().next())
	}

	async fn chunks_by_ids(&self, workspace: &WorkspaceId, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		decode_all(self.scan(&self.tables.chunks, filter::ids_in(workspace, ids)).await?, chunks_from_batch)
	}

	async fn chunks_in_spans(&self, workspace: &WorkspaceId, spans: &SpanFilter) -> Result<Vec<Chunk>> {
		if spans.is_empty() {
			return Ok(Vec::new());
		}
		decode_all(self.scan(&self.tables.chunks, filter::chunk_spans(workspace, spans)).await?, chunks_from_batch)
	}

	async fn nodes_by_ids(&self, workspace: &WorkspaceId, ids: &[NodeId]) -> Result<Vec<Node>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		decode_all(self.scan(&self.tables.nodes, filter::ids_in(workspace, ids)).await?, nodes_from_batch)
	}

	async fn nodes_for_document(&self, workspace: &WorkspaceId, document_id: &str) -> Result<Vec<Node>> {
		let mut nodes = decode_all(self.scan(&self.tables.nodes, filter::document(workspace, document_id)).await?, nodes_from_batch)?;
		nodes.sort_by_key(|n| n.node_index);
		Ok(nodes)
	}
}

pub(crate) fn decode_all<T>(batches: Vec<RecordBatch>, decode: fn(&RecordBatch) -> Result<Vec<T>>) -> Result<Vec<T>> {
	let mut out = Vec::new();
	for batch in &batches {
		out.extend(decode(batch)?);
	}
	Ok(out)
}

fn missing(name: &str) -> Error {
	Error::Operation(format!("column '{name}' missing or of unexpected type"))
}

pub(crate) fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| missing(name))
}

pub(crate) fn ints<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| missing(name))
}

pub(crate) fn floats<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| missing(name))
}

pub(crate) fn index_at(col: &Int32Array, row: usize) -> Result<usize> {
	usize::try_from(col.value(row)).map_err(|_| Error::InvalidCorpus(format!("negative index {}", col.value(row))))
}

fn vectors<'a>(batch: &'a RecordBatch) -> Result<&'a FixedSizeListArray> {
	batch.column_by_name(VECTOR).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>()).ok_or_else(|| missing(VECTOR))
}

fn vector_at(col: &FixedSizeListArray, row: usize) -> Result<Vec<f32>> {
	if col.is_null(row) {
		return Ok(Vec::new());
	}
	let values = col.value(row);
	let floats = values.as_primitive_opt::<Float32Type>().ok_or_else(|| missing(VECTOR))?;
	Ok(floats.values().to_vec())
}

pub(crate) fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = strings(batch, ID)?;
	let wss = strings(batch, WORKSPACE_ID)?;
	let docs = strings(batch, DOCUMENT_ID)?;
	let idxs = ints(batch, CHUNK_INDEX)?;
	let contents = strings(batch, CONTENT)?;
	let vecs = vectors(batch)?;
	(0..batch.num_rows())
		.map(|i| {
			Ok(Chunk {
				id: ids.value(i).to_string(),
				document_id: docs.value(i).to_string(),
				workspace_id: WorkspaceId::new(wss.value(i)),
				chunk_index: index_at(idxs, i)?,
				content: contents.value(i).to_string(),
				embedding: vector_at(vecs, i)?,
			})
		})
		.collect()
}

pub(crate) fn nodes_from_batch(batch: &RecordBatch) -> Result<Vec<Node>> {
	let ids = strings(batch, ID)?;
	let wss = strings(batch, WORKSPACE_ID)?;
	let docs = strings(batch, DOCUMENT_ID)?;
	let idxs = ints(batch, NODE_INDEX)?;
	let starts = ints(batch, SPAN_START)?;
	let ends = ints(batch, SPAN_END)?;
	let texts = strings(batch, TEXT)?;
	let vecs = vectors(batch)?;
	(0..batch.num_rows())
		.map(|i| {
			Ok(Node {
				id: ids.value(i).to_string(),
				document_id: docs.value(i).to_string(),
				workspace_id: WorkspaceId::new(wss.value(i)),
				node_index: index_at(idxs, i)?,
				span: ChunkSpan::new(index_at(starts, i)?, index_at(ends, i)?),
				text: texts.value(i).to_string(),
				embedding: vector_at(vecs, i)?,
			})
		})
		.collect()
}

fn workspaces_from_batch(batch: &RecordBatch) -> Result<Vec<Workspace>> {
	let ids = strings(batch, ID)?;
	let langs = strings(batch, LANGUAGE)?;
	Ok((0..batch.num_rows())
		.map(|i| Workspace { id: WorkspaceId::new(ids.value(i)), language_tag: langs.value(i).to_string() })
		.collect())
}

pub(crate) fn distances(batch: &RecordBatch) -> Result<&Float32Array> {
	floats(batch, DISTANCE)
}
