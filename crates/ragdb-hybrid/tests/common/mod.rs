#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ragdb_core::error::{Error, Result};
use ragdb_core::language::LexicalLanguage;
use ragdb_core::memory::InMemoryCorpus;
use ragdb_core::traits::{LexicalIndex, VectorIndex};
use ragdb_core::types::{Channel, Chunk, ChunkSpan, Granularity, IndexMatch, Node, SpanFilter, WorkspaceId};

pub const WS_A: &str = "ws-a";
pub const WS_B: &str = "ws-b";

pub fn chunk(ws: &str, doc: &str, idx: usize, content: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: format!("{doc}:{idx}"),
        document_id: doc.to_string(),
        workspace_id: WorkspaceId::new(ws),
        chunk_index: idx,
        content: content.to_string(),
        embedding,
    }
}

pub fn node(ws: &str, doc: &str, idx: usize, span: ChunkSpan, embedding: Vec<f32>) -> Node {
    Node {
        id: format!("{doc}:node:{idx}"),
        document_id: doc.to_string(),
        workspace_id: WorkspaceId::new(ws),
        node_index: idx,
        span,
        text: String::new(),
        embedding,
    }
}

/// Direction in the x/y plane at `degrees` from the x axis.
pub fn dir(degrees: f32) -> Vec<f32> {
    let r = degrees.to_radians();
    vec![r.cos(), r.sin(), 0.0]
}

/// Two small documents in `ws` about rivers and about bread.
pub fn sample_chunks(ws: &str) -> Vec<Chunk> {
    vec![
        chunk(ws, "rivers", 0, "The river delta floods every spring", dir(0.0)),
        chunk(ws, "rivers", 1, "Sediment builds the delta over centuries", dir(10.0)),
        chunk(ws, "rivers", 2, "Fishermen mend nets along the banks", dir(20.0)),
        chunk(ws, "bread", 0, "Sourdough needs a lively starter", dir(60.0)),
        chunk(ws, "bread", 1, "Bake the loaf in a hot oven", dir(70.0)),
        chunk(ws, "bread", 2, "A river of flour covered the bench", dir(80.0)),
    ]
}

pub fn sample_corpus() -> InMemoryCorpus {
    InMemoryCorpus::new().with_workspace(WS_A, "english").with_chunks(sample_chunks(WS_A))
}

pub struct FailingVectors;

#[async_trait]
impl VectorIndex for FailingVectors {
    async fn nearest(
        &self,
        _workspace: &WorkspaceId,
        _query: &[f32],
        _top_k: usize,
        _granularity: Granularity,
        _span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<IndexMatch>> {
        Err(Error::unavailable(Channel::Dense, "vector store offline"))
    }
}

pub struct FailingLexical;

#[async_trait]
impl LexicalIndex for FailingLexical {
    async fn search(
        &self,
        _workspace: &WorkspaceId,
        _query: &str,
        _language: LexicalLanguage,
        _top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        Err(Error::unavailable(Channel::Lexical, "index directory missing"))
    }
}

/// Records the language it was asked to search with, then returns nothing.
#[derive(Default)]
pub struct RecordingLexical {
    pub seen: std::sync::Mutex<Vec<LexicalLanguage>>,
}

#[async_trait]
impl LexicalIndex for RecordingLexical {
    async fn search(
        &self,
        _workspace: &WorkspaceId,
        _query: &str,
        language: LexicalLanguage,
        _top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        self.seen.lock().expect("lock").push(language);
        Ok(Vec::new())
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never completes; flips `dropped` when the pending call is dropped.
#[derive(Default)]
pub struct StalledIndex {
    pub dropped: Arc<AtomicBool>,
}

#[async_trait]
impl VectorIndex for StalledIndex {
    async fn nearest(
        &self,
        _workspace: &WorkspaceId,
        _query: &[f32],
        _top_k: usize,
        _granularity: Granularity,
        _span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<IndexMatch>> {
        let _guard = DropFlag(self.dropped.clone());
        std::future::pending::<Result<Vec<IndexMatch>>>().await
    }
}

#[async_trait]
impl LexicalIndex for StalledIndex {
    async fn search(
        &self,
        _workspace: &WorkspaceId,
        _query: &str,
        _language: LexicalLanguage,
        _top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let _guard = DropFlag(self.dropped.clone());
        std::future::pending::<Result<Vec<IndexMatch>>>().await
    }
}

/// Sleeps for `delay` before answering from `inner`.
pub struct DelayedVectors<V> {
    pub inner: V,
    pub delay: std::time::Duration,
}

#[async_trait]
impl<V: VectorIndex> VectorIndex for DelayedVectors<V> {
    async fn nearest(
        &self,
        workspace: &WorkspaceId,
        query: &[f32],
        top_k: usize,
        granularity: Granularity,
        span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<IndexMatch>> {
        tokio::time::sleep(self.delay).await;
        self.inner.nearest(workspace, query, top_k, granularity, span_filter).await
    }
}
