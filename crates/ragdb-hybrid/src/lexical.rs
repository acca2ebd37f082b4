use std::sync::Arc;

use ragdb_core::error::Result;
use ragdb_core::language::LexicalLanguage;
use ragdb_core::traits::LexicalIndex;
use ragdb_core::types::{Channel, RankedHit, WorkspaceId};

/// Lexical (full-text) retrieval at chunk granularity.
#[derive(Clone)]
pub struct LexicalRetriever {
    index: Arc<dyn LexicalIndex>,
}

impl LexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>) -> Self {
        Self { index }
    }

    /// Up to `top_k` hits by descending score, ties by chunk id. Blank queries
    /// short-circuit to an empty list without touching the index.
    pub async fn search(
        &self,
        workspace: &WorkspaceId,
        query: &str,
        language: LexicalLanguage,
        top_k: usize,
    ) -> Result<Vec<RankedHit>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.index.search(workspace, query, language, top_k).await?;
        let mut hits: Vec<RankedHit> =
            matches.into_iter().map(|m| RankedHit::from_match(m, Channel::Lexical)).collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.entity_id.cmp(&b.entity_id)));
        hits.truncate(top_k);
        tracing::debug!(%workspace, %language, hits = hits.len(), "lexical lookup");
        Ok(hits)
    }
}
