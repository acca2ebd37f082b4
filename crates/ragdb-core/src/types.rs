//! Domain types shared by the retrieval engine and its storage adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;
pub type NodeId = String;
pub type DocumentId = String;

/// Tenant boundary. Every lookup in the engine is scoped by one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A workspace and the raw lexical-language tag stored for it.
///
/// The tag is kept verbatim; it is validated against the configured
/// allowlist by [`crate::language::LanguagePolicy`] at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub language_tag: String,
}

/// Smallest retrievable unit of a document.
///
/// - `chunk_index`: zero-based position within the owning document
/// - `embedding`: dense vector, constant dimension per workspace/model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub workspace_id: WorkspaceId,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Coarse retrieval unit covering a contiguous run of chunks of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub document_id: DocumentId,
    pub workspace_id: WorkspaceId,
    pub node_index: usize,
    pub span: ChunkSpan,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Inclusive chunk-index range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    /// Builds a span, swapping the bounds if they arrive reversed.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn single(index: usize) -> Self {
        Self { start: index, end: index }
    }

    /// Number of chunks covered; a span always covers at least one.
    pub fn chunk_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }

    pub fn intersects(&self, other: &ChunkSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A chunk span anchored to one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentSpan {
    pub document_id: DocumentId,
    pub span: ChunkSpan,
}

/// Normalized set of document spans used to restrict a lookup.
///
/// Spans of the same document that overlap or touch are merged, and the
/// result is sorted by `(document_id, start)`, so two filters built from the
/// same spans in any order compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanFilter {
    spans: Vec<DocumentSpan>,
}

impl SpanFilter {
    pub fn new(spans: impl IntoIterator<Item = DocumentSpan>) -> Self {
        let mut spans: Vec<DocumentSpan> = spans.into_iter().collect();
        spans.sort();
        let mut merged: Vec<DocumentSpan> = Vec::with_capacity(spans.len());
        for next in spans {
            match merged.last_mut() {
                Some(last)
                    if last.document_id == next.document_id
                        && next.span.start <= last.span.end.saturating_add(1) =>
                {
                    last.span.end = last.span.end.max(next.span.end);
                }
                _ => merged.push(next),
            }
        }
        Self { spans: merged }
    }

    pub fn spans(&self) -> &[DocumentSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// True when `chunk_index` of `document_id` falls inside one of the spans.
    pub fn matches_chunk(&self, document_id: &str, chunk_index: usize) -> bool {
        self.spans
            .iter()
            .any(|s| s.document_id == document_id && s.span.contains(chunk_index))
    }

    /// True when `span` of `document_id` intersects one of the spans.
    pub fn matches_span(&self, document_id: &str, span: &ChunkSpan) -> bool {
        self.spans
            .iter()
            .any(|s| s.document_id == document_id && s.span.intersects(span))
    }
}

/// Which embedding table a dense lookup runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Chunk,
    Node,
}

/// Indicates which retrieval channel produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Dense,
    Lexical,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Dense => f.write_str("dense"),
            Channel::Lexical => f.write_str("lexical"),
        }
    }
}

/// Raw row returned by a storage adapter.
///
/// `score` is a distance for vector lookups (lower is better) and a
/// relevance score for lexical lookups (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub document_id: DocumentId,
    pub chunk_index: Option<usize>,
    pub score: f32,
}

/// Transient per-request hit produced by a retriever. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub entity_id: Option<String>,
    pub document_id: DocumentId,
    pub chunk_index: Option<usize>,
    /// Distance for [`Channel::Dense`], relevance for [`Channel::Lexical`].
    pub score: f32,
    pub channel: Channel,
}

impl RankedHit {
    pub fn from_match(m: IndexMatch, channel: Channel) -> Self {
        Self {
            entity_id: Some(m.id),
            document_id: m.document_id,
            chunk_index: m.chunk_index,
            score: m.score,
            channel,
        }
    }
}

/// A ranked passage handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub content: String,
    /// Reciprocal-rank fused score.
    pub score: f64,
    pub dense_distance: Option<f32>,
    pub lexical_score: Option<f32>,
    pub channels: Vec<Channel>,
}
