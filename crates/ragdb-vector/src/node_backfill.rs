//! Builds the coarse node tier of one workspace from its stored chunks.
//!
//! Each document is grouped into spans of `node_group_size` chunks, the span
//! text is embedded with the configured embedder, and the document's nodes
//! are replaced wholesale. Documents whose chunks are not contiguous are
//! skipped and reported; retrieval falls back to chunk-level search for them.
use anyhow::{anyhow, bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::nodes::{draft_nodes, NodeDraft};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{Chunk, DocumentId, Node, WorkspaceId};

use crate::store::LanceStore;
use crate::writer::LanceWriter;

/// Node drafts embedded per embedder call.
const EMBED_BATCH: usize = 32;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeBuildReport {
	pub documents: usize,
	pub nodes: usize,
	pub skipped: Vec<(DocumentId, String)>,
}

pub async fn build_nodes(
	store: &LanceStore,
	writer: &LanceWriter,
	embedder: &dyn Embedder,
	workspace: &WorkspaceId,
	settings: &RetrievalSettings,
	show_progress: bool,
) -> Result<NodeBuildReport> {
	if embedder.dim() != writer.dim() {
		bail!("embedder produces {} dimensions, node table expects {}", embedder.dim(), writer.dim());
	}
	let chunks = store.chunks_for_workspace(workspace).await?;
	let mut by_document: BTreeMap<DocumentId, Vec<Chunk>> = BTreeMap::new();
	for chunk in chunks {
		by_document.entry(chunk.document_id.clone()).or_default().push(chunk);
	}
	tracing::info!(%workspace, documents = by_document.len(), "building nodes");

	let pb = if show_progress { ProgressBar::new(by_document.len() as u64) } else { ProgressBar::hidden() };
	if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}") {
		pb.set_style(style.progress_chars("#>-"));
	}

	let mut report = NodeBuildReport::default();
	for (document_id, chunks) in by_document {
		pb.set_message(document_id.clone());
		let drafts = match draft_nodes(&chunks, settings.node_group_size, settings.node_text_max_chars) {
			Ok(drafts) => drafts,
			Err(e) => {
				tracing::warn!(%workspace, document = %document_id, error = %e, "skipping document");
				report.skipped.push((document_id, e.to_string()));
				pb.inc(1);
				continue;
			}
		};
		let nodes = embed_drafts(embedder, drafts)?;
		writer.replace_nodes(workspace, std::slice::from_ref(&document_id), &nodes).await?;
		report.documents += 1;
		report.nodes += nodes.len();
		pb.inc(1);
	}
	pb.finish_with_message("nodes built");
	tracing::info!(%workspace, documents = report.documents, nodes = report.nodes, skipped = report.skipped.len(), "node build finished");
	Ok(report)
}

fn embed_drafts(embedder: &dyn Embedder, drafts: Vec<NodeDraft>) -> Result<Vec<Node>> {
	let mut nodes = Vec::with_capacity(drafts.len());
	let mut drafts = drafts.into_iter().peekable();
	while drafts.peek().is_some() {
		let batch: Vec<NodeDraft> = drafts.by_ref().take(EMBED_BATCH).collect();
		let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
		let embeddings = embedder.embed_batch(&texts)?;
		if embeddings.len() != batch.len() {
			return Err(anyhow!("embedder returned {} vectors for {} texts", embeddings.len(), batch.len()));
		}
		nodes.extend(batch.into_iter().zip(embeddings).map(|(draft, embedding)| draft.into_node(embedding)));
	}
	Ok(nodes)
}
