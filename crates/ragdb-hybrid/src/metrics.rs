//! Per-caller usage counters for hybrid vs dense-only outcomes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const CALLERS: usize = 3;
const OUTCOMES: usize = 5;

/// Which code path invoked retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerPath {
    Answer,
    StreamedAnswer,
    Search,
}

impl CallerPath {
    pub const ALL: [CallerPath; CALLERS] = [CallerPath::Answer, CallerPath::StreamedAnswer, CallerPath::Search];

    fn slot(self) -> usize {
        self as usize
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "answer" => Some(CallerPath::Answer),
            "stream" | "streamed_answer" => Some(CallerPath::StreamedAnswer),
            "search" => Some(CallerPath::Search),
            _ => None,
        }
    }
}

impl fmt::Display for CallerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallerPath::Answer => "answer",
            CallerPath::StreamedAnswer => "streamed_answer",
            CallerPath::Search => "search",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    DenseOnly,
    Hybrid,
    /// Hybrid was attempted but the lexical leg failed or came back empty.
    HybridDegraded,
    Failed,
    /// Cancelled by the caller or past its deadline.
    Aborted,
}

impl Outcome {
    pub const ALL: [Outcome; OUTCOMES] =
        [Outcome::DenseOnly, Outcome::Hybrid, Outcome::HybridDegraded, Outcome::Failed, Outcome::Aborted];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::DenseOnly => "dense_only",
            Outcome::Hybrid => "hybrid",
            Outcome::HybridDegraded => "hybrid_degraded",
            Outcome::Failed => "failed",
            Outcome::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCount {
    pub caller: CallerPath,
    pub outcome: Outcome,
    pub count: u64,
}

/// Lock-free counters, shared by every request via `Arc`.
#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    counters: [[AtomicU64; OUTCOMES]; CALLERS],
}

impl RetrievalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, caller: CallerPath, outcome: Outcome) {
        self.counters[caller.slot()][outcome.slot()].fetch_add(1, Ordering::Relaxed);
        tracing::info!(target: "ragdb::usage", %caller, %outcome, "retrieval completed");
    }

    pub fn count(&self, caller: CallerPath, outcome: Outcome) -> u64 {
        self.counters[caller.slot()][outcome.slot()].load(Ordering::Relaxed)
    }

    /// Non-zero counters in `(caller, outcome)` declaration order.
    pub fn snapshot(&self) -> Vec<UsageCount> {
        CallerPath::ALL
            .iter()
            .flat_map(|&caller| Outcome::ALL.iter().map(move |&outcome| (caller, outcome)))
            .map(|(caller, outcome)| UsageCount { caller, outcome, count: self.count(caller, outcome) })
            .filter(|u| u.count > 0)
            .collect()
    }
}
