use std::sync::Arc;

use ragdb_core::error::Result;
use ragdb_core::traits::VectorIndex;
use ragdb_core::types::{Channel, Granularity, RankedHit, SpanFilter, WorkspaceId};

/// Dense (semantic) retrieval over chunk or node embeddings.
#[derive(Clone)]
pub struct DenseRetriever {
    index: Arc<dyn VectorIndex>,
}

impl DenseRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Up to `top_k` hits ordered by ascending distance, ties by entity id.
    ///
    /// Index errors are returned unchanged; the dense channel has no fallback.
    pub async fn search(
        &self,
        workspace: &WorkspaceId,
        query: &[f32],
        top_k: usize,
        granularity: Granularity,
        span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<RankedHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let matches = self.index.nearest(workspace, query, top_k, granularity, span_filter).await?;
        let mut hits: Vec<RankedHit> =
            matches.into_iter().map(|m| RankedHit::from_match(m, Channel::Dense)).collect();
        sort_by_distance(&mut hits);
        hits.truncate(top_k);
        tracing::debug!(%workspace, ?granularity, hits = hits.len(), "dense lookup");
        Ok(hits)
    }
}

pub(crate) fn sort_by_distance(hits: &mut [RankedHit]) {
    hits.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.entity_id.cmp(&b.entity_id)));
}
