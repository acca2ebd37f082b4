//! Hybrid query entry point.
//!
//! Runs the dense leg (two-tier when enabled) and, in hybrid mode, the lexical
//! leg concurrently under the caller's cancellation token and deadline, fuses
//! them in the fixed order `[dense, lexical]` and hydrates passages.
//!
//! The dense leg has no fallback: its errors fail the call unchanged. Lexical
//! errors and empty lexical results degrade to the dense ranking alone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::error::{Error, Result};
use ragdb_core::language::{LanguagePolicy, LexicalLanguage};
use ragdb_core::traits::{CorpusStore, LexicalIndex, VectorIndex};
use ragdb_core::types::{
    Channel, Chunk, ChunkId, ChunkSpan, DocumentSpan, Granularity, Passage, RankedHit, SpanFilter,
    WorkspaceId,
};

use crate::dense::DenseRetriever;
use crate::fusion::{fuse, FusedEntry, FusionKey};
use crate::hierarchical::{HierarchicalRetriever, TierPath};
use crate::lexical::LexicalRetriever;
use crate::metrics::{CallerPath, Outcome, RetrievalMetrics};

const DENSE_RANKING: usize = 0;
const LEXICAL_RANKING: usize = 1;

/// Per-request context supplied by the caller.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub caller: CallerPath,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    pub fn new(caller: CallerPath) -> Self {
        Self { caller, cancellation: CancellationToken::new(), deadline: None }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// What the lexical leg did for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexicalStatus {
    /// Hybrid mode is off; the leg never ran.
    Disabled,
    Contributed { hits: usize },
    Empty,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensePath {
    SingleTier,
    Tiered(TierPath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalMetadata {
    /// Hybrid mode was attempted, whether or not the lexical leg contributed.
    pub hybrid_used: bool,
    pub degraded: bool,
    pub lexical: LexicalStatus,
    pub dense_path: DensePath,
    /// Channels with at least one hit in the fused ranking, in fusion order.
    pub contributing: Vec<Channel>,
    /// Language the lexical leg ran with; `None` when it did not run.
    pub language: Option<LexicalLanguage>,
}

impl RetrievalMetadata {
    pub fn outcome(&self) -> Outcome {
        match (self.hybrid_used, self.degraded) {
            (false, _) => Outcome::DenseOnly,
            (true, false) => Outcome::Hybrid,
            (true, true) => Outcome::HybridDegraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub passages: Vec<Passage>,
    pub metadata: RetrievalMetadata,
}

struct LexicalLeg {
    language: LexicalLanguage,
    result: Result<Vec<RankedHit>>,
}

/// Entry point shared by every caller path. Cheap to clone.
#[derive(Clone)]
pub struct HybridRetriever {
    settings: Arc<RetrievalSettings>,
    languages: LanguagePolicy,
    dense: DenseRetriever,
    tiered: HierarchicalRetriever,
    lexical: LexicalRetriever,
    corpus: Arc<dyn CorpusStore>,
    metrics: Arc<RetrievalMetrics>,
}

impl HybridRetriever {
    pub fn new(
        settings: RetrievalSettings,
        vectors: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        corpus: Arc<dyn CorpusStore>,
        metrics: Arc<RetrievalMetrics>,
    ) -> Result<Self> {
        settings.validate()?;
        let languages = LanguagePolicy::from_settings(&settings)?;
        let dense = DenseRetriever::new(vectors);
        let tiered = HierarchicalRetriever::from_settings(dense.clone(), corpus.clone(), &settings);
        Ok(Self {
            settings: Arc::new(settings),
            languages,
            dense,
            tiered,
            lexical: LexicalRetriever::new(lexical),
            corpus,
            metrics,
        })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<RetrievalMetrics> {
        &self.metrics
    }

    /// Ranked passages for one query scoped to `workspace`.
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`] when the
    /// caller aborts; both legs are dropped at that point.
    pub async fn retrieve(
        &self,
        ctx: &QueryContext,
        workspace: &WorkspaceId,
        query_text: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Retrieval> {
        let work = self.run(workspace, query_text, query_vector, top_k);
        let result = tokio::select! {
            biased;
            () = ctx.cancellation.cancelled() => Err(Error::Cancelled),
            r = within_deadline(ctx.deadline, work) => r,
        };

        let outcome = match &result {
            Ok(r) => r.metadata.outcome(),
            Err(e) if e.is_abort() => Outcome::Aborted,
            Err(_) => Outcome::Failed,
        };
        self.metrics.record(ctx.caller, outcome);
        match &result {
            Ok(r) => tracing::debug!(%workspace, passages = r.passages.len(), %outcome, "retrieval done"),
            Err(e) if e.is_abort() => tracing::debug!(%workspace, error = %e, "retrieval aborted"),
            Err(e) => tracing::error!(%workspace, error = %e, "retrieval failed"),
        }
        result
    }

    async fn run(
        &self,
        workspace: &WorkspaceId,
        query_text: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Retrieval> {
        if !self.settings.hybrid_search_enabled {
            let (dense_hits, dense_path) = self.dense_leg(workspace, query_vector, top_k).await?;
            let legs = [dense_hits, Vec::new()];
            let passages = self.assemble(workspace, &legs, top_k).await?;
            let contributing = channels_in(&passages);
            return Ok(Retrieval {
                passages,
                metadata: RetrievalMetadata {
                    hybrid_used: false,
                    degraded: false,
                    lexical: LexicalStatus::Disabled,
                    dense_path,
                    contributing,
                    language: None,
                },
            });
        }

        // A dense error drops the lexical future without waiting on it.
        let ((dense_hits, dense_path), lexical) = tokio::try_join!(
            self.dense_leg(workspace, query_vector, top_k),
            async { Ok::<_, Error>(self.lexical_leg(workspace, query_text, top_k).await) },
        )?;

        let (lexical_hits, status) = match lexical.result {
            Ok(hits) if hits.is_empty() => {
                tracing::info!(%workspace, language = %lexical.language, "lexical leg returned nothing, using dense ranking");
                (Vec::new(), LexicalStatus::Empty)
            }
            Ok(hits) => {
                let count = hits.len();
                (hits, LexicalStatus::Contributed { hits: count })
            }
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                tracing::warn!(%workspace, error = %e, "lexical leg failed, degrading to dense ranking");
                (Vec::new(), LexicalStatus::Failed { reason: e.to_string() })
            }
        };

        let legs = [dense_hits, lexical_hits];
        let passages = self.assemble(workspace, &legs, top_k).await?;
        let degraded = !matches!(status, LexicalStatus::Contributed { .. });
        let contributing = channels_in(&passages);
        Ok(Retrieval {
            passages,
            metadata: RetrievalMetadata {
                hybrid_used: true,
                degraded,
                lexical: status,
                dense_path,
                contributing,
                language: Some(lexical.language),
            },
        })
    }

    async fn dense_leg(
        &self,
        workspace: &WorkspaceId,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<(Vec<RankedHit>, DensePath)> {
        if self.settings.two_tier_enabled {
            let fine_top_k = top_k.max(self.settings.fine_top_k);
            let tiered = self.tiered.search(workspace, query_vector, fine_top_k).await?;
            Ok((tiered.hits, DensePath::Tiered(tiered.path)))
        } else {
            let hits = self
                .dense
                .search(workspace, query_vector, top_k, Granularity::Chunk, None)
                .await?;
            Ok((hits, DensePath::SingleTier))
        }
    }

    async fn lexical_leg(&self, workspace: &WorkspaceId, query_text: &str, top_k: usize) -> LexicalLeg {
        let tag = match self.corpus.workspace(workspace).await {
            Ok(ws) => ws.map(|w| w.language_tag),
            Err(e) => {
                return LexicalLeg { language: self.languages.fallback(), result: Err(e) };
            }
        };
        let language = self.languages.resolve(tag.as_deref());
        let result = self.lexical.search(workspace, query_text, language, top_k).await;
        LexicalLeg { language, result }
    }

    /// Fuses `[dense, lexical]`, keeps `top_k` and hydrates the survivors.
    async fn assemble(
        &self,
        workspace: &WorkspaceId,
        legs: &[Vec<RankedHit>; 2],
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        let mut fused = fuse::<RankedHit, _>(legs, self.settings.rrf_k);
        fused.truncate(top_k);
        tracing::debug!(
            %workspace,
            dense = legs[DENSE_RANKING].len(),
            lexical = legs[LEXICAL_RANKING].len(),
            fused = fused.len(),
            "fused rankings"
        );
        self.hydrate(workspace, legs, fused).await
    }

    async fn hydrate(
        &self,
        workspace: &WorkspaceId,
        legs: &[Vec<RankedHit>; 2],
        fused: Vec<FusedEntry<RankedHit>>,
    ) -> Result<Vec<Passage>> {
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<ChunkId> = Vec::new();
        let mut positions: Vec<DocumentSpan> = Vec::new();
        for entry in &fused {
            match &entry.key {
                FusionKey::Chunk(id) => ids.push(id.clone()),
                FusionKey::Position(doc, idx) => positions.push(DocumentSpan {
                    document_id: doc.clone(),
                    span: ChunkSpan::single(*idx),
                }),
            }
        }

        let mut by_id: HashMap<ChunkId, Chunk> = HashMap::new();
        let mut by_position: HashMap<(String, usize), Chunk> = HashMap::new();
        if !ids.is_empty() {
            for chunk in self.corpus.chunks_by_ids(workspace, &ids).await? {
                by_id.insert(chunk.id.clone(), chunk);
            }
        }
        if !positions.is_empty() {
            let filter = SpanFilter::new(positions);
            for chunk in self.corpus.chunks_in_spans(workspace, &filter).await? {
                by_position.insert((chunk.document_id.clone(), chunk.chunk_index), chunk);
            }
        }

        let mut passages = Vec::with_capacity(fused.len());
        for entry in fused {
            let chunk = match &entry.key {
                FusionKey::Chunk(id) => by_id.get(id),
                FusionKey::Position(doc, idx) => by_position.get(&(doc.clone(), *idx)),
            };
            let Some(chunk) = chunk else {
                tracing::warn!(%workspace, key = ?entry.key, "fused hit has no stored chunk, dropping");
                continue;
            };
            let channel_score = |ranking: usize| {
                entry.rank_in(ranking).and_then(|rank| legs[ranking].get(rank - 1)).map(|h| h.score)
            };
            let channels = entry
                .sources
                .iter()
                .map(|s| if s.ranking == DENSE_RANKING { Channel::Dense } else { Channel::Lexical })
                .collect();
            passages.push(Passage {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                score: entry.score,
                dense_distance: channel_score(DENSE_RANKING),
                lexical_score: channel_score(LEXICAL_RANKING),
                channels,
            });
        }
        Ok(passages)
    }
}

async fn within_deadline<T, F>(deadline: Option<Instant>, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(at) => match tokio::time::timeout_at(at, work).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded),
        },
        None => work.await,
    }
}

fn channels_in(passages: &[Passage]) -> Vec<Channel> {
    let mut channels: Vec<Channel> = passages.iter().flat_map(|p| p.channels.iter().copied()).collect();
    channels.sort();
    channels.dedup();
    channels
}
