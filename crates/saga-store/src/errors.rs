//! Error types for session storage.
//!
//! [`StoreError::is_retryable`] splits failures into transient ones (the
//! backend may accept the same write moments later) and permanent ones
//! (retrying the same payload fails the same way).

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors returned by [`crate::SessionStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend out of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Operation did not finish in time.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error (checkout timed out).
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Snapshot (de)serialization failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// Request the backend will never accept.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Internal failure (e.g. a blocking task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::QuotaExceeded(_) | Self::Timeout(_) | Self::Pool(_) => {
                true
            }
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::DiskFull)
            ),
            Self::Serde(_) | Self::Migration { .. } | Self::Invalid(_) | Self::Internal(_) => false,
        }
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
