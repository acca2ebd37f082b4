use thiserror::Error;

use crate::types::Channel;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{channel} retrieval unavailable: {reason}")]
    RetrievalUnavailable { channel: Channel, reason: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Retrieval cancelled by caller")]
    Cancelled,

    #[error("Retrieval deadline exceeded")]
    DeadlineExceeded,

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn unavailable(channel: Channel, reason: impl std::fmt::Display) -> Self {
        Self::RetrievalUnavailable { channel, reason: reason.to_string() }
    }

    /// True for caller-side aborts, which are never treated as degradation.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
