//! Stale-snapshot detection and resolution.
//!
//! Two writers (tabs, devices) can hold diverging copies of one session. A
//! write is a conflict when the stored snapshot looks newer than the incoming
//! one: it was updated more than the tolerance later, or it has more turns.
//! Progress wins over recency: the snapshot with more turns is kept, and only
//! an equal turn count falls back to the later `updated_at`.

use std::time::Duration;

use chrono::TimeDelta;
use saga_core::Session;

/// Which snapshot survived a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The stored snapshot was rewritten unchanged.
    KeptStored,
    /// The incoming snapshot replaced the stored one.
    KeptIncoming,
}

impl Resolution {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeptStored => "kept_stored",
            Self::KeptIncoming => "kept_incoming",
        }
    }
}

/// Conflict detection thresholds.
#[derive(Clone, Copy, Debug)]
pub struct ConflictPolicy {
    tolerance: TimeDelta,
}

impl ConflictPolicy {
    /// Stored snapshots newer by at most `tolerance` are not conflicts.
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance: TimeDelta::from_std(tolerance).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Compare the stored snapshot with the one about to be written.
    pub fn detect<'a>(
        &self,
        stored: &'a Session,
        incoming: &'a Session,
    ) -> Option<SnapshotConflict<'a>> {
        let newer_by = stored.updated_at - incoming.updated_at;
        let stale = newer_by > self.tolerance;
        let behind = stored.turn_count() > incoming.turn_count();
        (stale || behind).then_some(SnapshotConflict { stored, incoming })
    }
}

/// A detected conflict between two snapshots of one session.
#[derive(Debug)]
pub struct SnapshotConflict<'a> {
    /// Snapshot currently in the store.
    pub stored: &'a Session,
    /// Snapshot the caller asked to write.
    pub incoming: &'a Session,
}

impl<'a> SnapshotConflict<'a> {
    /// Pick the snapshot to keep.
    pub fn resolve(&self) -> Resolution {
        let stored_turns = self.stored.turn_count();
        let incoming_turns = self.incoming.turn_count();
        if stored_turns != incoming_turns {
            return if stored_turns > incoming_turns {
                Resolution::KeptStored
            } else {
                Resolution::KeptIncoming
            };
        }
        if self.stored.updated_at > self.incoming.updated_at {
            Resolution::KeptStored
        } else {
            Resolution::KeptIncoming
        }
    }

    /// The snapshot chosen by [`Self::resolve`].
    pub fn winner(&self) -> &'a Session {
        match self.resolve() {
            Resolution::KeptStored => self.stored,
            Resolution::KeptIncoming => self.incoming,
        }
    }
}
