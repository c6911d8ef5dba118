//! Vector writer (C6): upserts embeddings keyed by entity identity into
//! Qdrant, deduplicated per `(entity_id, entity_type, chunk_index)`.

pub mod error;
pub mod store;

pub use error::{Result, VectorError};
pub use store::{VectorSink, VectorStoreConfig, VectorWriter, WriteOutcome, REPO_ID_FIELD};
