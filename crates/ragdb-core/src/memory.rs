//! In-memory corpus implementing every storage contract.
//!
//! Brute-force cosine kNN and a small BM25 scorer over a fixed snapshot of
//! workspaces, chunks and nodes. Deterministic, so orchestration logic can be
//! tested without LanceDB or Tantivy.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::Result;
use crate::language::LexicalLanguage;
use crate::similarity::cosine_distance;
use crate::traits::{CorpusStore, LexicalIndex, VectorIndex};
use crate::types::{
    Chunk, ChunkId, Granularity, IndexMatch, Node, NodeId, SpanFilter, Workspace, WorkspaceId,
};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    workspaces: HashMap<WorkspaceId, Workspace>,
    chunks: BTreeMap<(WorkspaceId, ChunkId), Chunk>,
    nodes: BTreeMap<(WorkspaceId, NodeId), Node>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, id: impl Into<WorkspaceId>, language_tag: &str) -> Self {
        let id = id.into();
        self.workspaces.insert(id.clone(), Workspace { id, language_tag: language_tag.to_string() });
        self
    }

    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = Chunk>) -> Self {
        for c in chunks {
            self.chunks.insert((c.workspace_id.clone(), c.id.clone()), c);
        }
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        for n in nodes {
            self.nodes.insert((n.workspace_id.clone(), n.id.clone()), n);
        }
        self
    }

    /// Chunks of one workspace in `(chunk id)` order.
    pub fn chunks_of<'a>(&'a self, workspace: &'a WorkspaceId) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks.iter().filter(move |((ws, _), _)| ws == workspace).map(|(_, c)| c)
    }

    fn nodes_of<'a>(&'a self, workspace: &'a WorkspaceId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |((ws, _), _)| ws == workspace).map(|(_, n)| n)
    }
}

fn analyze(text: &str, language: LexicalLanguage) -> Vec<String> {
    let stop_words = language.stop_words();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !stop_words.contains(&t.as_str()))
        .collect()
}

fn rank_ascending(mut matches: Vec<IndexMatch>, top_k: usize) -> Vec<IndexMatch> {
    matches.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id)));
    matches.truncate(top_k);
    matches
}

#[async_trait]
impl VectorIndex for InMemoryCorpus {
    async fn nearest(
        &self,
        workspace: &WorkspaceId,
        query: &[f32],
        top_k: usize,
        granularity: Granularity,
        span_filter: Option<&SpanFilter>,
    ) -> Result<Vec<IndexMatch>> {
        let mut matches = Vec::new();
        match granularity {
            Granularity::Chunk => {
                for c in self.chunks_of(workspace) {
                    if span_filter.is_some_and(|f| !f.matches_chunk(&c.document_id, c.chunk_index)) {
                        continue;
                    }
                    matches.push(IndexMatch {
                        id: c.id.clone(),
                        document_id: c.document_id.clone(),
                        chunk_index: Some(c.chunk_index),
                        score: cosine_distance(query, &c.embedding)?,
                    });
                }
            }
            Granularity::Node => {
                for n in self.nodes_of(workspace) {
                    if span_filter.is_some_and(|f| !f.matches_span(&n.document_id, &n.span)) {
                        continue;
                    }
                    matches.push(IndexMatch {
                        id: n.id.clone(),
                        document_id: n.document_id.clone(),
                        chunk_index: None,
                        score: cosine_distance(query, &n.embedding)?,
                    });
                }
            }
        }
        Ok(rank_ascending(matches, top_k))
    }
}

#[async_trait]
impl LexicalIndex for InMemoryCorpus {
    async fn search(
        &self,
        workspace: &WorkspaceId,
        query: &str,
        language: LexicalLanguage,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let terms: HashSet<String> = analyze(query, language).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<(&Chunk, Vec<String>)> =
            self.chunks_of(workspace).map(|c| (c, analyze(&c.content, language))).collect();
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let n = docs.len() as f32;
        let avgdl = (docs.iter().map(|(_, t)| t.len()).sum::<usize>() as f32 / n).max(1.0);
        let df: HashMap<&str, usize> = terms
            .iter()
            .map(|term| (term.as_str(), docs.iter().filter(|(_, t)| t.contains(term)).count()))
            .collect();

        let mut matches = Vec::new();
        for (chunk, tokens) in &docs {
            let dl = tokens.len() as f32;
            let mut score = 0.0f32;
            for term in &terms {
                let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let df = df.get(term.as_str()).copied().unwrap_or(0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                score += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
            }
            if score > 0.0 {
                matches.push(IndexMatch {
                    id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    chunk_index: Some(chunk.chunk_index),
                    score,
                });
            }
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
        Ok(self.workspaces.get(id).cloned())
    }

    async fn chunks_by_ids(&self, workspace: &WorkspaceId, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.chunks.get(&(workspace.clone(), id.clone())).cloned())
            .collect())
    }

    async fn chunks_in_spans(&self, workspace: &WorkspaceId, filter: &SpanFilter) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks_of(workspace)
            .filter(|c| filter.matches_chunk(&c.document_id, c.chunk_index))
            .cloned()
            .collect())
    }

    async fn nodes_by_ids(&self, workspace: &WorkspaceId, ids: &[NodeId]) -> Result<Vec<Node>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(&(workspace.clone(), id.clone())).cloned())
            .collect())
    }

    async fn nodes_for_document(&self, workspace: &WorkspaceId, document_id: &str) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> =
            self.nodes_of(workspace).filter(|n| n.document_id == document_id).cloned().collect();
        nodes.sort_by_key(|n| n.node_index);
        Ok(nodes)
    }
}
