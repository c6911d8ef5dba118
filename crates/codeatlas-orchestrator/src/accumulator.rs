//! Per-request result accumulator (spec §5 "Shared-resource policy": "A
//! per-request structure mutated only under a mutex held for the duration
//! of an append; counts use atomic addition").

use crate::error::OrchestratorError;
use crate::response::IndexErrorEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct ResultAccumulator {
    pub files_processed: AtomicU64,
    pub symbols_created: AtomicU64,
    pub edges_created: AtomicU64,
    pub vectors_created: AtomicU64,
    /// Count of files that completed every write for their file-level unit
    /// (used to compute `status`: at least one success + at least one
    /// failure makes the run `partial`).
    pub files_succeeded: AtomicU64,
    pub files_failed: AtomicU64,
    /// Count of embedding-phase failures (transient/permanent/dimension
    /// mismatch). Kept separate from `files_failed` because a relational
    /// write can succeed for every file while the embedding phase still
    /// fails outright — that combination must still downgrade `status`
    /// away from `Success` (spec.md's embedder dimension-mismatch boundary
    /// behavior), which `files_failed` alone can't express.
    pub embedding_errors: AtomicU64,
    errors: Mutex<Vec<IndexErrorEntry>>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file_success(&self, symbols: u64, edges: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.symbols_created.fetch_add(symbols, Ordering::Relaxed);
        self.edges_created.fetch_add(edges, Ordering::Relaxed);
    }

    pub fn record_file_failure(&self, err: &OrchestratorError, file_path: String) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        self.push_error(err, Some(file_path));
    }

    pub fn record_vectors(&self, count: u64) {
        self.vectors_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_embedding_failure(&self, err: &OrchestratorError, file_path: Option<String>) {
        self.embedding_errors.fetch_add(1, Ordering::Relaxed);
        self.push_error(err, file_path);
    }

    pub fn push_error(&self, err: &OrchestratorError, file_path: Option<String>) {
        let mut errors = self.errors.lock();
        errors.push(IndexErrorEntry::from_error(err, file_path));
    }

    pub fn total_error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn embedding_error_count(&self) -> u64 {
        self.embedding_errors.load(Ordering::Relaxed)
    }

    pub fn into_errors(self) -> Vec<IndexErrorEntry> {
        self.errors.into_inner()
    }

    pub fn load(&self) -> (u64, u64, u64, u64, u64, u64) {
        (
            self.files_processed.load(Ordering::Relaxed),
            self.symbols_created.load(Ordering::Relaxed),
            self.edges_created.load(Ordering::Relaxed),
            self.vectors_created.load(Ordering::Relaxed),
            self.files_succeeded.load(Ordering::Relaxed),
            self.files_failed.load(Ordering::Relaxed),
        )
    }
}
