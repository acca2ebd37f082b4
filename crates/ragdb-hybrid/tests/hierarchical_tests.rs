mod common;

use std::sync::Arc;

use ragdb_core::memory::InMemoryCorpus;
use ragdb_core::types::{ChunkSpan, Granularity, WorkspaceId};
use ragdb_hybrid::{DenseRetriever, FallbackReason, HierarchicalRetriever, TierPath};

use common::{chunk, dir, node, sample_corpus, WS_A};

fn tiered(corpus: &Arc<InMemoryCorpus>, coarse_top_k: usize) -> HierarchicalRetriever {
    HierarchicalRetriever::new(DenseRetriever::new(corpus.clone()), corpus.clone(), coarse_top_k)
}

/// Ten chunks of `long`: 0..=4 near the x axis, 5..=9 near the y axis,
/// plus a stray chunk in `other` that is the best chunk-level match.
fn two_tier_corpus() -> InMemoryCorpus {
    let mut chunks = Vec::new();
    for i in 0..5 {
        chunks.push(chunk(WS_A, "long", i, &format!("intro part {i}"), dir(i as f32 * 2.0)));
    }
    for i in 5..10 {
        chunks.push(chunk(WS_A, "long", i, &format!("body part {i}"), dir(80.0 + (i - 5) as f32 * 2.0)));
    }
    chunks.push(chunk(WS_A, "other", 0, "stray", dir(85.5)));
    InMemoryCorpus::new().with_workspace(WS_A, "english").with_chunks(chunks).with_nodes([
        node(WS_A, "long", 0, ChunkSpan::new(0, 4), dir(0.0)),
        node(WS_A, "long", 1, ChunkSpan::new(5, 9), dir(90.0)),
        node(WS_A, "other", 0, ChunkSpan::single(0), dir(-30.0)),
    ])
}

#[tokio::test]
async fn falls_back_to_chunk_search_when_workspace_has_no_nodes() {
    let corpus = Arc::new(sample_corpus());
    let ws = WorkspaceId::new(WS_A);
    let query = dir(15.0);

    let result = tiered(&corpus, 2).search(&ws, &query, 4).await.expect("tiered search");
    let single = DenseRetriever::new(corpus.clone())
        .search(&ws, &query, 4, Granularity::Chunk, None)
        .await
        .expect("dense search");

    assert_eq!(result.path, TierPath::Fallback(FallbackReason::NoNodes));
    assert_eq!(result.hits, single);
    assert_eq!(result.hits.len(), 4);
}

#[tokio::test]
async fn reranks_chunks_inside_selected_node_spans() {
    let corpus = Arc::new(two_tier_corpus());
    let ws = WorkspaceId::new(WS_A);

    let result = tiered(&corpus, 1).search(&ws, &dir(85.5), 3).await.expect("tiered search");

    assert_eq!(result.path, TierPath::TwoTier { nodes: 1, candidates: 5 });
    let ids: Vec<_> = result.hits.iter().filter_map(|h| h.entity_id.as_deref()).collect();
    assert_eq!(ids, vec!["long:8", "long:7", "long:9"]);
    assert!(result.hits.windows(2).all(|w| w[0].score <= w[1].score), "ascending distance");
}

#[tokio::test]
async fn two_tier_scope_differs_from_flat_search() {
    let corpus = Arc::new(two_tier_corpus());
    let ws = WorkspaceId::new(WS_A);
    let flat = DenseRetriever::new(corpus.clone())
        .search(&ws, &dir(85.5), 1, Granularity::Chunk, None)
        .await
        .expect("dense search");
    assert_eq!(flat[0].entity_id.as_deref(), Some("other:0"));

    let result = tiered(&corpus, 1).search(&ws, &dir(85.5), 1).await.expect("tiered search");
    assert_eq!(result.hits[0].entity_id.as_deref(), Some("long:8"));
}

#[tokio::test]
async fn nodes_without_stored_chunks_fall_back() {
    let corpus = Arc::new(
        sample_corpus().with_nodes([node(WS_A, "ghost", 0, ChunkSpan::new(0, 4), dir(15.0))]),
    );
    let ws = WorkspaceId::new(WS_A);

    let result = tiered(&corpus, 2).search(&ws, &dir(15.0), 3).await.expect("tiered search");
    let single = DenseRetriever::new(corpus.clone())
        .search(&ws, &dir(15.0), 3, Granularity::Chunk, None)
        .await
        .expect("dense search");

    assert_eq!(result.path, TierPath::Fallback(FallbackReason::NoChunksInSpans));
    assert_eq!(result.hits, single);
}

#[tokio::test]
async fn nodes_of_other_workspaces_are_invisible() {
    let corpus = Arc::new(
        sample_corpus()
            .with_workspace("ws-b", "english")
            .with_nodes([node("ws-b", "rivers", 0, ChunkSpan::new(0, 2), dir(10.0))]),
    );
    let result = tiered(&corpus, 2)
        .search(&WorkspaceId::new(WS_A), &dir(10.0), 3)
        .await
        .expect("tiered search");
    assert_eq!(result.path, TierPath::Fallback(FallbackReason::NoNodes));
}
