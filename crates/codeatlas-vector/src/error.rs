//! Error taxonomy for the vector writer, split transient/permanent per
//! spec §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("transient vector store error: {0}")]
    Transient(String),

    #[error("permanent vector store error: {0}")]
    Permanent(String),
}

impl VectorError {
    pub fn retryable(&self) -> bool {
        matches!(self, VectorError::Transient(_))
    }
}

impl From<qdrant_client::QdrantError> for VectorError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        VectorError::Transient(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VectorError>;
