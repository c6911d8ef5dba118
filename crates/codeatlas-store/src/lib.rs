//! Relational store (C3): SQLite-backed, idempotent persistence for the
//! entities the Change Detector and Graph Builder work against.
//!
//! Non-goals: this crate does not decide *what* to write (validation lives
//! in `codeatlas-core::validate`) or *whether* a file changed (that's
//! `codeatlas-core::diff`) — it only persists what it's handed, batched and
//! transactionally, and answers checksum queries so the caller can diff.

pub mod error;
pub mod pool;
pub mod schema;
pub mod writer;

pub use error::{StoreError, Result};
pub use pool::{ConnectionPool, PooledConnection};
pub use writer::{FileWriteCounts, ItemResult, RelationalWriter, WriterConfig};
