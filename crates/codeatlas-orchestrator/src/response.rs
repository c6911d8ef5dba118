//! Indexing response shape (spec §6.2).

use crate::error::OrchestratorError;
use std::time::Duration;
use uuid::Uuid;

/// Cap on the number of errors surfaced in the response body (spec §7
/// "truncated to the first N (default 10) for display; the full list is
/// logged").
pub const MAX_DISPLAYED_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Success,
    Partial,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Success => "success",
            IndexStatus::Partial => "partial",
            IndexStatus::Failed => "failed",
        }
    }
}

/// One error entry in the response body (spec §6.2 `errors[]`).
#[derive(Debug, Clone)]
pub struct IndexErrorEntry {
    pub error_type: &'static str,
    pub file_path: Option<String>,
    pub message: String,
    pub retryable: bool,
}

impl IndexErrorEntry {
    pub fn from_error(err: &OrchestratorError, file_path: Option<String>) -> Self {
        Self {
            error_type: err.kind(),
            file_path,
            message: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

/// `IndexResult` (spec §6.2 / §4.7).
#[derive(Debug, Clone)]
pub struct IndexResult {
    pub repo_id: Uuid,
    pub status: IndexStatus,
    pub files_processed: u64,
    pub symbols_created: u64,
    pub edges_created: u64,
    pub vectors_created: u64,
    pub errors: Vec<IndexErrorEntry>,
    pub total_errors: usize,
    pub duration: Duration,
}

impl IndexResult {
    /// The first `MAX_DISPLAYED_ERRORS` errors, for the wire response; the
    /// full list is expected to be logged by the caller separately.
    pub fn displayed_errors(&self) -> &[IndexErrorEntry] {
        let n = self.errors.len().min(MAX_DISPLAYED_ERRORS);
        &self.errors[..n]
    }
}
