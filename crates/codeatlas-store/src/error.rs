//! Error taxonomy for the relational writer, split into transient (retried)
//! and permanent (surfaced per-item, never retried) per spec §7.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Connection loss, serialization conflict, SQLITE_BUSY/SQLITE_LOCKED —
    /// retried with exponential backoff up to `max_retries`.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Constraint violation or invalid data — recorded against the
    /// offending item, never retried.
    #[error("permanent store error: {0}")]
    Permanent(String),

    #[error("pool exhausted: no connection became available in time")]
    PoolExhausted,
}

impl StoreError {
    pub fn retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        classify_sqlite_error(&err)
    }
}

/// Classify a `rusqlite::Error` as transient or permanent following spec §7:
/// connection loss / serialization conflicts are transient; constraint
/// violations and malformed data are permanent.
pub fn classify_sqlite_error(err: &rusqlite::Error) -> StoreError {
    use rusqlite::ffi::ErrorCode;
    use rusqlite::Error as E;

    match err {
        E::SqliteFailure(sqlite_err, msg) => match sqlite_err.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                StoreError::Transient(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            ErrorCode::ConstraintViolation => {
                StoreError::Permanent(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => StoreError::Permanent(err.to_string()),
        },
        other => StoreError::Permanent(other.to_string()),
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
