use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;
use arrow_array::RecordBatch;

use ragdb_core::error::Result;
use ragdb_core::traits::VectorIndex;
use ragdb_core::types::{Granularity, IndexMatch, SpanFilter, WorkspaceId};

use crate::filter;
use crate::schema::{CHUNK_INDEX, DOCUMENT_ID, ID};
use crate::store::{distances, index_at, ints, strings, unavailable, LanceStore};

#[async_trait]
impl VectorIndex for LanceStore {
	/// Exact cosine kNN with the workspace predicate applied before the search.
	async fn nearest(&self, workspace: &WorkspaceId, query: &[f32], top_k: usize, granularity: Granularity, span_filter: Option<&SpanFilter>) -> Result<Vec<IndexMatch>> {
		if top_k == 0 || span_filter.is_some_and(SpanFilter::is_empty) {
			return Ok(Vec::new());
		}
		let (table_name, predicate, columns) = match granularity {
			Granularity::Chunk => (
				&self.tables.chunks,
				span_filter.map_or_else(|| filter::workspace(workspace), |f| filter::chunk_spans(workspace, f)),
				vec![ID, DOCUMENT_ID, CHUNK_INDEX],
			),
			Granularity::Node => (
				&self.tables.nodes,
				span_filter.map_or_else(|| filter::workspace(workspace), |f| filter::node_spans(workspace, f)),
				vec![ID, DOCUMENT_ID],
			),
		};
		let Some(table) = self.table(table_name).await? else {
			tracing::debug!(table = %table_name, "vector table missing, no matches");
			return Ok(Vec::new());
		};
		let stream = table
			.vector_search(query.to_vec())
			.map_err(unavailable)?
			.distance_type(DistanceType::Cosine)
			.select(Select::columns(columns.as_slice()))
			.only_if(predicate)
			.limit(top_k)
			.execute()
			.await
			.map_err(unavailable)?;
		let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(unavailable)?;

		let mut matches = Vec::new();
		for batch in &batches {
			let ids = strings(batch, ID)?;
			let docs = strings(batch, DOCUMENT_ID)?;
			let dist = distances(batch)?;
			let idxs = match granularity {
				Granularity::Chunk => Some(ints(batch, CHUNK_INDEX)?),
				Granularity::Node => None,
			};
			for i in 0..batch.num_rows() {
				matches.push(IndexMatch {
					id: ids.value(i).to_string(),
					document_id: docs.value(i).to_string(),
					chunk_index: idxs.map(|col| index_at(col, i)).transpose()?,
					score: dist.value(i),
				});
			}
		}
		matches.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id)));
		Ok(matches)
	}
}
