//! Hybrid retrieval and ranking.
//!
//! [`HybridRetriever`] is the entry point. The retrievers, the two-tier
//! orchestrator and [`fusion::fuse`] are public so callers can compose them
//! directly.

pub mod dense;
pub mod fusion;
pub mod hierarchical;
pub mod lexical;
pub mod metrics;
pub mod orchestrator;

pub use dense::DenseRetriever;
pub use fusion::{fuse, FusedEntry, FusionKey, DEFAULT_RRF_K};
pub use hierarchical::{FallbackReason, HierarchicalRetriever, TierPath, TieredHits};
pub use lexical::LexicalRetriever;
pub use metrics::{CallerPath, Outcome, RetrievalMetrics, UsageCount};
pub use orchestrator::{
    DensePath, HybridRetriever, LexicalStatus, QueryContext, Retrieval, RetrievalMetadata,
};
