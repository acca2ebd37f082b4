mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::error::Error;
use ragdb_core::language::LexicalLanguage;
use ragdb_core::memory::InMemoryCorpus;
use ragdb_core::traits::{LexicalIndex, VectorIndex};
use ragdb_core::types::{Channel, ChunkSpan, Passage, WorkspaceId};
use ragdb_hybrid::{
    CallerPath, DensePath, FallbackReason, HybridRetriever, LexicalStatus, Outcome, QueryContext,
    RetrievalMetrics, TierPath,
};

use common::{
    dir, node, sample_chunks, sample_corpus, DelayedVectors, FailingLexical, FailingVectors,
    RecordingLexical, StalledIndex, WS_A, WS_B,
};

fn settings(hybrid: bool, two_tier: bool) -> RetrievalSettings {
    RetrievalSettings {
        hybrid_search_enabled: hybrid,
        two_tier_enabled: two_tier,
        ..RetrievalSettings::default()
    }
}

fn build(
    settings: RetrievalSettings,
    vectors: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    corpus: Arc<InMemoryCorpus>,
) -> HybridRetriever {
    HybridRetriever::new(settings, vectors, lexical, corpus, Arc::new(RetrievalMetrics::new()))
        .expect("valid settings")
}

fn in_memory(settings: RetrievalSettings, corpus: &Arc<InMemoryCorpus>) -> HybridRetriever {
    build(settings, corpus.clone(), corpus.clone(), corpus.clone())
}

fn ids(passages: &[Passage]) -> Vec<&str> {
    passages.iter().map(|p| p.chunk_id.as_str()).collect()
}

fn ctx(caller: CallerPath) -> QueryContext {
    QueryContext::new(caller)
}

#[tokio::test]
async fn dense_only_mode_ranks_by_distance() {
    let corpus = Arc::new(sample_corpus());
    let engine = in_memory(settings(false, false), &corpus);

    let out = engine
        .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "delta", &dir(3.0), 3)
        .await
        .expect("retrieve");

    assert_eq!(ids(&out.passages), vec!["rivers:0", "rivers:1", "rivers:2"]);
    assert!((out.passages[0].score - 1.0 / 61.0).abs() < 1e-12);
    assert!(out.passages.iter().all(|p| p.channels == vec![Channel::Dense]));
    assert!(out.passages.iter().all(|p| p.dense_distance.is_some() && p.lexical_score.is_none()));
    assert_eq!(out.passages[0].content, "The river delta floods every spring");

    assert!(!out.metadata.hybrid_used);
    assert!(!out.metadata.degraded);
    assert_eq!(out.metadata.lexical, LexicalStatus::Disabled);
    assert_eq!(out.metadata.dense_path, DensePath::SingleTier);
    assert_eq!(out.metadata.contributing, vec![Channel::Dense]);
    assert_eq!(out.metadata.language, None);
    assert_eq!(engine.metrics().count(CallerPath::Search, Outcome::DenseOnly), 1);
}

#[tokio::test]
async fn hybrid_mode_fuses_both_legs() {
    let corpus = Arc::new(sample_corpus());
    let engine = in_memory(settings(true, false), &corpus);

    let out = engine
        .retrieve(&ctx(CallerPath::Answer), &WorkspaceId::new(WS_A), "delta", &dir(74.0), 3)
        .await
        .expect("retrieve");

    // Dense: bread:1, bread:2, bread:0. Lexical: the two "delta" chunks.
    assert_eq!(out.passages.len(), 3);
    assert_eq!(out.passages[0].chunk_id, "bread:1");
    assert_eq!(out.passages[1].document_id, "rivers");
    assert_eq!(out.passages[1].channels, vec![Channel::Lexical]);
    assert!(out.passages[1].lexical_score.is_some());
    assert!(out.passages[1].dense_distance.is_none());
    assert_eq!(out.passages[2].chunk_id, "bread:2");

    assert!(out.metadata.hybrid_used);
    assert!(!out.metadata.degraded);
    assert_eq!(out.metadata.lexical, LexicalStatus::Contributed { hits: 2 });
    assert_eq!(out.metadata.contributing, vec![Channel::Dense, Channel::Lexical]);
    assert_eq!(out.metadata.language, Some(LexicalLanguage::English));
    assert_eq!(out.metadata.outcome(), Outcome::Hybrid);
    assert_eq!(engine.metrics().count(CallerPath::Answer, Outcome::Hybrid), 1);
}

#[tokio::test]
async fn chunk_found_by_both_legs_is_returned_once() {
    let corpus = Arc::new(sample_corpus());
    let engine = in_memory(settings(true, false), &corpus);

    let out = engine
        .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "river", &dir(3.0), 5)
        .await
        .expect("retrieve");

    let top = &out.passages[0];
    assert_eq!(top.chunk_id, "rivers:0");
    assert_eq!(top.channels, vec![Channel::Dense, Channel::Lexical]);
    assert!(top.dense_distance.is_some() && top.lexical_score.is_some());
    assert_eq!(out.passages.iter().filter(|p| p.chunk_id == "rivers:0").count(), 1);
}

#[tokio::test]
async fn lexical_failure_degrades_to_dense_ranking() {
    let corpus = Arc::new(sample_corpus());
    let dense_only = in_memory(settings(false, false), &corpus);
    let engine = build(settings(true, false), corpus.clone(), Arc::new(FailingLexical), corpus.clone());
    let ws = WorkspaceId::new(WS_A);

    let out = engine
        .retrieve(&ctx(CallerPath::StreamedAnswer), &ws, "delta", &dir(3.0), 4)
        .await
        .expect("degraded result is still a success");
    let baseline = dense_only
        .retrieve(&ctx(CallerPath::Search), &ws, "delta", &dir(3.0), 4)
        .await
        .expect("retrieve");

    assert_eq!(out.passages, baseline.passages);
    assert!(out.metadata.hybrid_used);
    assert!(out.metadata.degraded);
    assert!(matches!(out.metadata.lexical, LexicalStatus::Failed { .. }));
    assert_eq!(out.metadata.contributing, vec![Channel::Dense]);
    assert_eq!(engine.metrics().count(CallerPath::StreamedAnswer, Outcome::HybridDegraded), 1);
}

#[tokio::test]
async fn stopword_only_query_degrades_without_error() {
    let corpus = Arc::new(sample_corpus());
    let engine = in_memory(settings(true, false), &corpus);

    let out = engine
        .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "the of and", &dir(3.0), 3)
        .await
        .expect("retrieve");

    assert_eq!(out.metadata.lexical, LexicalStatus::Empty);
    assert!(out.metadata.degraded);
    assert_eq!(out.passages.len(), 3);
}

#[tokio::test]
async fn dense_failure_is_surfaced_in_both_modes() {
    let corpus = Arc::new(sample_corpus());
    for hybrid in [false, true] {
        let engine = build(settings(hybrid, false), Arc::new(FailingVectors), corpus.clone(), corpus.clone());
        let err = engine
            .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "delta", &dir(3.0), 3)
            .await
            .expect_err("dense failure must fail the call");
        assert!(matches!(err, Error::RetrievalUnavailable { channel: Channel::Dense, .. }), "{err}");
        assert_eq!(engine.metrics().count(CallerPath::Search, Outcome::Failed), 1);
    }
}

#[tokio::test]
async fn workspaces_never_leak_into_each_other() {
    let leaked: Vec<_> = sample_chunks(WS_B)
        .into_iter()
        .map(|mut c| {
            c.content = format!("tenant b delta river {}", c.content);
            c
        })
        .collect();
    let corpus = Arc::new(sample_corpus().with_workspace(WS_B, "english").with_chunks(leaked));

    for hybrid in [false, true] {
        let engine = in_memory(settings(hybrid, false), &corpus);
        let out = engine
            .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "tenant delta river", &dir(3.0), 6)
            .await
            .expect("retrieve");
        assert_eq!(out.passages.len(), 6);
        assert!(out.passages.iter().all(|p| !p.content.contains("tenant b")), "hybrid={hybrid}");

        let other = engine
            .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_B), "tenant delta river", &dir(3.0), 6)
            .await
            .expect("retrieve");
        assert!(other.passages.iter().all(|p| p.content.starts_with("tenant b")), "hybrid={hybrid}");
    }
}

#[tokio::test]
async fn unknown_workspace_language_falls_back_to_default() {
    let corpus = Arc::new(
        InMemoryCorpus::new().with_workspace(WS_A, "klingon").with_chunks(sample_chunks(WS_A)),
    );
    let lexical = Arc::new(RecordingLexical::default());
    let engine = build(settings(true, false), corpus.clone(), lexical.clone(), corpus.clone());

    let out = engine
        .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "delta", &dir(3.0), 3)
        .await
        .expect("retrieve");

    assert_eq!(out.metadata.language, Some(LexicalLanguage::English));
    assert_eq!(*lexical.seen.lock().expect("lock"), vec![LexicalLanguage::English]);
}

#[tokio::test]
async fn allowlisted_workspace_language_is_used() {
    let corpus = Arc::new(
        InMemoryCorpus::new().with_workspace(WS_A, "German").with_chunks(sample_chunks(WS_A)),
    );
    let lexical = Arc::new(RecordingLexical::default());
    let engine = build(settings(true, false), corpus.clone(), lexical.clone(), corpus.clone());

    engine
        .retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "delta", &dir(3.0), 3)
        .await
        .expect("retrieve");

    assert_eq!(*lexical.seen.lock().expect("lock"), vec![LexicalLanguage::German]);
}

#[tokio::test]
async fn two_tier_without_nodes_matches_single_tier() {
    let corpus = Arc::new(sample_corpus());
    let ws = WorkspaceId::new(WS_A);
    let tiered = in_memory(settings(false, true), &corpus);
    let flat = in_memory(settings(false, false), &corpus);

    let a = tiered.retrieve(&ctx(CallerPath::Search), &ws, "", &dir(33.0), 4).await.expect("tiered");
    let b = flat.retrieve(&ctx(CallerPath::Search), &ws, "", &dir(33.0), 4).await.expect("flat");

    assert_eq!(a.passages, b.passages);
    assert_eq!(a.metadata.dense_path, DensePath::Tiered(TierPath::Fallback(FallbackReason::NoNodes)));
}

#[tokio::test]
async fn two_tier_feeds_the_dense_leg_in_hybrid_mode() {
    let corpus = Arc::new(sample_corpus().with_nodes([
        node(WS_A, "rivers", 0, ChunkSpan::new(0, 2), dir(10.0)),
        node(WS_A, "bread", 0, ChunkSpan::new(0, 2), dir(70.0)),
    ]));
    let mut s = settings(true, true);
    s.coarse_top_k = 1;
    let engine = in_memory(s, &corpus);

    let out = engine
        .retrieve(&ctx(CallerPath::Answer), &WorkspaceId::new(WS_A), "sourdough", &dir(75.0), 3)
        .await
        .expect("retrieve");

    assert_eq!(out.metadata.dense_path, DensePath::Tiered(TierPath::TwoTier { nodes: 1, candidates: 3 }));
    assert!(out.passages.iter().all(|p| p.document_id == "bread"));
    assert_eq!(out.metadata.lexical, LexicalStatus::Contributed { hits: 1 });
}

#[tokio::test]
async fn cancelled_request_is_aborted_before_any_work() {
    let corpus = Arc::new(sample_corpus());
    let engine = in_memory(settings(true, false), &corpus);
    let token = CancellationToken::new();
    token.cancel();

    let err = engine
        .retrieve(
            &QueryContext::new(CallerPath::Search).with_cancellation(token),
            &WorkspaceId::new(WS_A),
            "delta",
            &dir(3.0),
            3,
        )
        .await
        .expect_err("cancelled");

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(engine.metrics().count(CallerPath::Search, Outcome::Aborted), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_drops_both_in_flight_legs() {
    let corpus = Arc::new(sample_corpus());
    let vectors = Arc::new(StalledIndex::default());
    let lexical = Arc::new(StalledIndex::default());
    let engine = build(settings(true, false), vectors.clone(), lexical.clone(), corpus);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = engine
        .retrieve(
            &QueryContext::new(CallerPath::Answer).with_cancellation(token),
            &WorkspaceId::new(WS_A),
            "delta",
            &dir(3.0),
            3,
        )
        .await
        .expect_err("cancelled");

    assert!(matches!(err, Error::Cancelled));
    assert!(vectors.dropped.load(Ordering::SeqCst), "dense leg dropped");
    assert!(lexical.dropped.load(Ordering::SeqCst), "lexical leg dropped");
}

#[tokio::test(start_paused = true)]
async fn dense_failure_does_not_wait_for_a_stalled_lexical_leg() {
    let corpus = Arc::new(sample_corpus());
    let vectors = Arc::new(DelayedVectors { inner: FailingVectors, delay: Duration::from_millis(5) });
    let lexical = Arc::new(StalledIndex::default());
    let engine = build(settings(true, false), vectors, lexical.clone(), corpus);

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        engine.retrieve(&ctx(CallerPath::Search), &WorkspaceId::new(WS_A), "delta", &dir(3.0), 3),
    )
    .await
    .expect("dense failure returned before the timeout");

    let err = result.expect_err("dense failure");
    assert!(matches!(err, Error::RetrievalUnavailable { channel: Channel::Dense, .. }));
    assert!(lexical.dropped.load(Ordering::SeqCst), "lexical leg dropped");
    assert_eq!(engine.metrics().count(CallerPath::Search, Outcome::Failed), 1);
}

#[tokio::test(start_paused = true)]
async fn leg_completion_order_does_not_change_fusion() {
    let corpus = Arc::new(sample_corpus());
    let prompt = in_memory(settings(true, false), &corpus);
    let slow_dense = build(
        settings(true, false),
        Arc::new(DelayedVectors { inner: sample_corpus(), delay: Duration::from_millis(20) }),
        corpus.clone(),
        corpus.clone(),
    );
    let ws = WorkspaceId::new(WS_A);

    let expected = prompt
        .retrieve(&ctx(CallerPath::Search), &ws, "delta", &dir(74.0), 5)
        .await
        .expect("retrieve");
    let delayed = slow_dense
        .retrieve(&ctx(CallerPath::Search), &ws, "delta", &dir(74.0), 5)
        .await
        .expect("retrieve");

    assert_eq!(ids(&delayed.passages), ids(&expected.passages));
    for (a, b) in delayed.passages.iter().zip(&expected.passages) {
        assert!((a.score - b.score).abs() < 1e-12);
        assert_eq!(a.channels, b.channels);
    }
    assert_eq!(delayed.metadata.lexical, LexicalStatus::Contributed { hits: 2 });
}

#[tokio::test(start_paused = true)]
async fn deadline_aborts_stalled_legs() {
    let corpus = Arc::new(sample_corpus());
    let vectors = Arc::new(StalledIndex::default());
    let engine = build(settings(false, false), vectors.clone(), corpus.clone(), corpus);

    let err = engine
        .retrieve(
            &QueryContext::new(CallerPath::Search).with_timeout(Duration::from_millis(50)),
            &WorkspaceId::new(WS_A),
            "delta",
            &dir(3.0),
            3,
        )
        .await
        .expect_err("deadline");

    assert!(matches!(err, Error::DeadlineExceeded));
    assert!(vectors.dropped.load(Ordering::SeqCst));
    assert_eq!(engine.metrics().count(CallerPath::Search, Outcome::Aborted), 1);
}

#[tokio::test]
async fn metrics_snapshot_reports_each_caller_path() {
    let corpus = Arc::new(sample_corpus());
    let metrics = Arc::new(RetrievalMetrics::new());
    let engine =
        HybridRetriever::new(settings(true, false), corpus.clone(), corpus.clone(), corpus, metrics.clone())
            .expect("valid settings");
    let ws = WorkspaceId::new(WS_A);

    for caller in [CallerPath::Answer, CallerPath::Answer, CallerPath::StreamedAnswer] {
        engine.retrieve(&ctx(caller), &ws, "delta", &dir(3.0), 2).await.expect("retrieve");
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].caller, CallerPath::Answer);
    assert_eq!(snapshot[0].outcome, Outcome::Hybrid);
    assert_eq!(snapshot[0].count, 2);
    assert_eq!(snapshot[1].caller, CallerPath::StreamedAnswer);
    assert_eq!(snapshot[1].count, 1);
}

#[test]
fn invalid_settings_are_rejected_at_construction() {
    let corpus = Arc::new(sample_corpus());
    let mut bad = settings(true, true);
    bad.coarse_top_k = 0;
    let result =
        HybridRetriever::new(bad, corpus.clone(), corpus.clone(), corpus, Arc::new(RetrievalMetrics::new()));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
