//! Storage and provider contracts consumed by the retrieval engine.
//!
//! Every method is scoped by a [`WorkspaceId`]; adapters must never return
//! rows owned by another workspace. Implementations are shared across
//! concurrent requests, hence `Send + Sync`.

use async_trait::async_trait;

use crate::error::Result;
use crate::language::LexicalLanguage;
use crate::types::{
    Chunk, ChunkId, Granularity, IndexMatch, Node, NodeId, SpanFilter, Workspace, WorkspaceId,
};

/// Supplies query vectors. Corpus embedding happens at ingestion time.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// k-nearest-neighbour lookup over chunk or node embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` matches ordered by ascending distance.
    ///
    /// With a `span_filter`, chunk rows must fall inside one of the spans and
    /// node rows must have a span intersecting one of them.
    async fn nearest(
        &self,
        workspace: &WorkspaceId,
        query: &[f32],
        top_k: usize,
        granularity: Granularity,
        span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<IndexMatch>>;
}

/// Ranked full-text lookup at chunk granularity.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Returns up to `top_k` matches ordered by descending relevance.
    /// A query without indexable tokens yields an empty list.
    async fn search(
        &self,
        workspace: &WorkspaceId,
        query: &str,
        language: LexicalLanguage,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>>;
}

/// Read-only access to stored workspaces, chunks and nodes.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>>;

    /// Chunks with the given ids; unknown ids are skipped, order unspecified.
    async fn chunks_by_ids(&self, workspace: &WorkspaceId, ids: &[ChunkId]) -> Result<Vec<Chunk>>;

    /// Every chunk whose `(document_id, chunk_index)` falls inside the filter,
    /// fetched in one round-trip.
    async fn chunks_in_spans(&self, workspace: &WorkspaceId, filter: &SpanFilter)
        -> Result<Vec<Chunk>>;

    async fn nodes_by_ids(&self, workspace: &WorkspaceId, ids: &[NodeId]) -> Result<Vec<Node>>;

    /// Nodes of one document ordered by node index.
    async fn nodes_for_document(&self, workspace: &WorkspaceId, document_id: &str)
        -> Result<Vec<Node>>;
}
