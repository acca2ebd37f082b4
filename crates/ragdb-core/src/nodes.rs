//! Node planning for two-tier retrieval.
//!
//! A document's chunks `0..N-1` are grouped into consecutive runs of
//! `group_size`; each run becomes one node whose text is the member contents
//! joined by newlines and cut to `max_chars` characters.

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkSpan, DocumentId, Node, NodeId, WorkspaceId};

/// Disjoint, ordered spans covering `0..chunk_count`; the last may be short.
pub fn plan_spans(chunk_count: usize, group_size: usize) -> Result<Vec<ChunkSpan>> {
    if group_size == 0 {
        return Err(Error::InvalidConfig("node group size must be greater than zero".into()));
    }
    Ok((0..chunk_count)
        .step_by(group_size)
        .map(|start| ChunkSpan::new(start, (start + group_size - 1).min(chunk_count - 1)))
        .collect())
}

/// Deterministic node text: newline-joined contents, prefix-cut by characters.
pub fn node_text<'a>(contents: impl IntoIterator<Item = &'a str>, max_chars: usize) -> String {
    let joined = contents.into_iter().collect::<Vec<_>>().join("\n");
    match joined.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => joined[..byte_pos].to_string(),
        None => joined,
    }
}

pub fn node_id(document_id: &str, node_index: usize) -> NodeId {
    format!("{document_id}:node:{node_index}")
}

/// A node before its text has been embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub id: NodeId,
    pub document_id: DocumentId,
    pub workspace_id: WorkspaceId,
    pub node_index: usize,
    pub span: ChunkSpan,
    pub text: String,
}

impl NodeDraft {
    pub fn into_node(self, embedding: Vec<f32>) -> Node {
        Node {
            id: self.id,
            document_id: self.document_id,
            workspace_id: self.workspace_id,
            node_index: self.node_index,
            span: self.span,
            text: self.text,
            embedding,
        }
    }
}

/// Plans the nodes of one document from its full chunk list.
///
/// Chunks may arrive in any order but must belong to a single document and
/// workspace and carry indices `0..N-1` without gaps or duplicates.
pub fn draft_nodes(chunks: &[Chunk], group_size: usize, max_chars: usize) -> Result<Vec<NodeDraft>> {
    let Some(first) = chunks.first() else { return Ok(Vec::new()) };
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);
    for (expected, chunk) in ordered.iter().enumerate() {
        if chunk.document_id != first.document_id || chunk.workspace_id != first.workspace_id {
            return Err(Error::InvalidCorpus(format!(
                "chunk '{}' does not belong to document '{}'",
                chunk.id, first.document_id
            )));
        }
        if chunk.chunk_index != expected {
            return Err(Error::InvalidCorpus(format!(
                "document '{}' has non-contiguous chunk indices: expected {expected}, found {}",
                first.document_id, chunk.chunk_index
            )));
        }
    }
    let spans = plan_spans(ordered.len(), group_size)?;
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(node_index, span)| NodeDraft {
            id: node_id(&first.document_id, node_index),
            document_id: first.document_id.clone(),
            workspace_id: first.workspace_id.clone(),
            node_index,
            span,
            text: node_text(
                ordered[span.start..=span.end].iter().map(|c| c.content.as_str()),
                max_chars,
            ),
        })
        .collect())
}
