//! Orchestrator error taxonomy (spec §7). Distinct from the per-store error
//! types: this is what actually reaches `IndexResult.errors`.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("permanent store error: {0}")]
    PermanentStore(String),

    #[error("transient embedder error: {0}")]
    EmbedderTransient(String),

    #[error("permanent embedder error: {0}")]
    EmbedderPermanent(String),

    /// Fatal for the whole job (spec §4.5/§7.3): the embedder's output
    /// dimension no longer matches the store's configured dimension.
    /// Distinguished from `EmbedderPermanent` so the orchestrator can abort
    /// the embedding phase outright instead of skipping one symbol.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbedderDimensionMismatch { expected: usize, actual: usize },

    #[error("request cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransientStore(_) | OrchestratorError::EmbedderTransient(_)
        )
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, OrchestratorError::EmbedderDimensionMismatch { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "ValidationError",
            OrchestratorError::TransientStore(_) => "TransientStoreError",
            OrchestratorError::PermanentStore(_) => "PermanentStoreError",
            OrchestratorError::EmbedderTransient(_) => "EmbedderTransient",
            OrchestratorError::EmbedderPermanent(_) => "EmbedderPermanent",
            OrchestratorError::EmbedderDimensionMismatch { .. } => "EmbedderDimensionMismatch",
            OrchestratorError::Cancelled => "Cancelled",
        }
    }
}

impl From<codeatlas_store::StoreError> for OrchestratorError {
    fn from(err: codeatlas_store::StoreError) -> Self {
        if err.retryable() {
            OrchestratorError::TransientStore(err.to_string())
        } else {
            OrchestratorError::PermanentStore(err.to_string())
        }
    }
}

impl From<codeatlas_embed::EmbedError> for OrchestratorError {
    fn from(err: codeatlas_embed::EmbedError) -> Self {
        match err {
            codeatlas_embed::EmbedError::DimensionMismatch { expected, actual } => {
                OrchestratorError::EmbedderDimensionMismatch { expected, actual }
            }
            other if other.retryable() => OrchestratorError::EmbedderTransient(other.to_string()),
            other => OrchestratorError::EmbedderPermanent(other.to_string()),
        }
    }
}

impl From<codeatlas_vector::VectorError> for OrchestratorError {
    fn from(err: codeatlas_vector::VectorError) -> Self {
        if err.retryable() {
            OrchestratorError::TransientStore(err.to_string())
        } else {
            OrchestratorError::PermanentStore(err.to_string())
        }
    }
}
