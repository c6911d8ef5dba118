//! Embedder client (C5): `embed(texts) → vectors`, position-preserving,
//! batched, rate-limited, and retried on transient failure.
//!
//! Non-goals: this crate does not decide what to embed or where the result
//! is stored — that's the orchestrator's job feeding `codeatlas-vector`.

pub mod client;
pub mod error;
pub mod wire;

pub use client::{EmbedderBackend, EmbedderClient, EmbedderConfig};
pub use error::{EmbedError, Result};
pub use wire::{EmbedDatum, EmbedRequest, EmbedResponse};
