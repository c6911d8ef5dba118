//! Error taxonomy for the embedder client, split transient/permanent per
//! spec §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// Timeout, connection failure, 5xx, or 429 — retried with backoff up
    /// to `max_retries`.
    #[error("transient embedder error: {0}")]
    Transient(String),

    /// 4xx other than 429, or a dimension mismatch — fatal for this batch,
    /// never retried.
    #[error("permanent embedder error: {0}")]
    Permanent(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    pub fn retryable(&self) -> bool {
        matches!(self, EmbedError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
