//! Persistence coordination.
//!
//! Session mutations reach the store through a [`PersistenceCoordinator`]:
//!
//! - [`PersistenceCoordinator::schedule_write`] debounces bursts of
//!   non-critical updates into a single write
//! - [`PersistenceCoordinator::write_now`] persists immediately (turn ends)
//! - every write is validated, conflict-checked against the stored snapshot
//!   and retried with backoff on transient store failures
//!
//! Failures never propagate as errors. They come back as a [`WriteOutcome`]
//! and are broadcast as [`PersistenceEvent`]s so a UI can show a "save
//! failed" notice while play continues.

mod conflict;
mod coordinator;

use std::time::Duration;

use saga_core::retry::RetryConfig;
use saga_core::{SessionId, ValidationError};
use saga_store::StoreError;

pub use conflict::{ConflictPolicy, Resolution, SnapshotConflict};
pub use coordinator::PersistenceCoordinator;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1_000);
/// Default conflict tolerance.
pub const DEFAULT_CONFLICT_TOLERANCE: Duration = Duration::from_millis(2_000);
/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Coordinator timing and retry policy.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistenceConfig {
    /// Delay between the last `schedule_write` and the write.
    pub debounce: Duration,
    /// How much newer a stored snapshot may be before it counts as a conflict.
    pub conflict_tolerance: Duration,
    /// Backoff for retryable store errors.
    pub retry: RetryConfig,
    /// Broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            conflict_tolerance: DEFAULT_CONFLICT_TOLERANCE,
            retry: RetryConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Result of one write.
#[derive(Debug)]
pub enum WriteOutcome {
    /// A snapshot was stored. `resolution` is set when a conflict was resolved.
    Written {
        /// Conflict resolution, if the stored snapshot conflicted.
        resolution: Option<Resolution>,
        /// Store attempts used, including the successful one.
        attempts: u32,
    },
    /// The snapshot failed validation and was not written.
    Rejected(ValidationError),
    /// Every attempt failed, or a non-retryable error occurred.
    Failed {
        /// Store attempts made.
        attempts: u32,
        /// The last error.
        error: StoreError,
    },
}

impl WriteOutcome {
    /// Whether a snapshot reached the store.
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Where a session ID sits in the write lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing scheduled or running.
    Unscheduled,
    /// A debounced write is armed.
    Pending,
    /// A write is talking to the store.
    InFlight,
}

/// Broadcast after every write attempt sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceEvent {
    /// A snapshot was stored.
    Written {
        /// Session written.
        session_id: SessionId,
        /// Conflict resolution, if any.
        resolution: Option<Resolution>,
    },
    /// A snapshot failed validation.
    Rejected {
        /// Session rejected.
        session_id: SessionId,
        /// Validation message.
        reason: String,
    },
    /// The store kept failing.
    Failed {
        /// Session that was not saved.
        session_id: SessionId,
        /// Last error message.
        error: String,
        /// Store attempts made.
        attempts: u32,
    },
}

impl PersistenceEvent {
    /// Session the event is about.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Written { session_id, .. }
            | Self::Rejected { session_id, .. }
            | Self::Failed { session_id, .. } => session_id,
        }
    }
}
