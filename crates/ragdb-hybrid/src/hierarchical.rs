//! Two-tier (node → chunk) dense retrieval.
//!
//! CoarseLookup → FineLookup → LocalRerank, or Fallback when the workspace has
//! no nodes yet. The fallback is exactly a chunk-granularity dense search with
//! the same `top_k`.

use std::sync::Arc;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::error::Result;
use ragdb_core::similarity::cosine_distance;
use ragdb_core::traits::CorpusStore;
use ragdb_core::types::{
    Channel, Chunk, DocumentSpan, Granularity, NodeId, RankedHit, SpanFilter, WorkspaceId,
};

use crate::dense::{sort_by_distance, DenseRetriever};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoNodes,
    NoChunksInSpans,
}

/// How a two-tier search produced its hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPath {
    TwoTier { nodes: usize, candidates: usize },
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TieredHits {
    pub hits: Vec<RankedHit>,
    pub path: TierPath,
}

enum Stage {
    CoarseLookup,
    FineLookup(Vec<RankedHit>),
    LocalRerank { nodes: usize, chunks: Vec<Chunk> },
    Fallback(FallbackReason),
}

#[derive(Clone)]
pub struct HierarchicalRetriever {
    dense: DenseRetriever,
    corpus: Arc<dyn CorpusStore>,
    coarse_top_k: usize,
}

impl HierarchicalRetriever {
    pub fn new(dense: DenseRetriever, corpus: Arc<dyn CorpusStore>, coarse_top_k: usize) -> Self {
        Self { dense, corpus, coarse_top_k }
    }

    pub fn from_settings(
        dense: DenseRetriever,
        corpus: Arc<dyn CorpusStore>,
        settings: &RetrievalSettings,
    ) -> Self {
        Self::new(dense, corpus, settings.coarse_top_k)
    }

    /// Top `fine_top_k` chunks for `query`, ascending by cosine distance.
    pub async fn search(
        &self,
        workspace: &WorkspaceId,
        query: &[f32],
        fine_top_k: usize,
    ) -> Result<TieredHits> {
        let mut stage = Stage::CoarseLookup;
        loop {
            stage = match stage {
                Stage::CoarseLookup => {
                    let nodes = self
                        .dense
                        .search(workspace, query, self.coarse_top_k, Granularity::Node, None)
                        .await?;
                    if nodes.is_empty() {
                        Stage::Fallback(FallbackReason::NoNodes)
                    } else {
                        Stage::FineLookup(nodes)
                    }
                }
                Stage::FineLookup(selected) => {
                    let ids: Vec<NodeId> = selected.into_iter().filter_map(|h| h.entity_id).collect();
                    let nodes = self.corpus.nodes_by_ids(workspace, &ids).await?;
                    let filter = SpanFilter::new(nodes.iter().map(|n| DocumentSpan {
                        document_id: n.document_id.clone(),
                        span: n.span,
                    }));
                    if filter.is_empty() {
                        Stage::Fallback(FallbackReason::NoNodes)
                    } else {
                        let chunks = self.corpus.chunks_in_spans(workspace, &filter).await?;
                        if chunks.is_empty() {
                            Stage::Fallback(FallbackReason::NoChunksInSpans)
                        } else {
                            Stage::LocalRerank { nodes: nodes.len(), chunks }
                        }
                    }
                }
                Stage::LocalRerank { nodes, chunks } => {
                    let candidates = chunks.len();
                    let mut hits = Vec::with_capacity(candidates);
                    for chunk in chunks {
                        let distance = cosine_distance(query, &chunk.embedding)?;
                        hits.push(RankedHit {
                            entity_id: Some(chunk.id),
                            document_id: chunk.document_id,
                            chunk_index: Some(chunk.chunk_index),
                            score: distance,
                            channel: Channel::Dense,
                        });
                    }
                    sort_by_distance(&mut hits);
                    hits.truncate(fine_top_k);
                    tracing::debug!(%workspace, nodes, candidates, kept = hits.len(), "two-tier rerank");
                    return Ok(TieredHits { hits, path: TierPath::TwoTier { nodes, candidates } });
                }
                Stage::Fallback(reason) => {
                    tracing::debug!(%workspace, ?reason, "two-tier falling back to chunk-level dense search");
                    let hits = self
                        .dense
                        .search(workspace, query, fine_top_k, Granularity::Chunk, None)
                        .await?;
                    return Ok(TieredHits { hits, path: TierPath::Fallback(reason) });
                }
            };
        }
    }
}
