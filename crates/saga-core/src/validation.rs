//! Structural validation of sessions before they are persisted.
//!
//! A malformed in-memory mutation must never reach durable storage, so the
//! persistence layer runs [`validate_session`] on every snapshot and drops
//! the write when it fails.

use std::collections::HashSet;

use thiserror::Error;

use crate::session::{Segment, Session, SessionMode};

/// A structural invariant a session violates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The session ID is empty.
    #[error("session id is empty")]
    EmptySessionId,

    /// A segment ID is empty.
    #[error("segment at {position} has an empty id")]
    EmptySegmentId {
        /// Where the segment sits (`current` or `history[i]`).
        position: String,
    },

    /// Segment and action histories have diverged.
    #[error("history length mismatch: {segments} segments, {actions} actions")]
    HistoryLengthMismatch {
        /// Number of history segments.
        segments: usize,
        /// Number of history actions.
        actions: usize,
    },

    /// A custom-mode segment offers choices.
    #[error("custom-mode segment at {position} has {count} choices")]
    ChoicesInCustomMode {
        /// Where the segment sits.
        position: String,
        /// Number of offending choices.
        count: usize,
    },

    /// Two choices in one segment share an ID.
    #[error("segment at {position} has duplicate choice id {choice_id}")]
    DuplicateChoiceId {
        /// Where the segment sits.
        position: String,
        /// The repeated ID.
        choice_id: String,
    },

    /// `updated_at` is before `created_at`.
    #[error("updated_at precedes created_at")]
    TimestampsOutOfOrder,
}

/// Check every structural invariant of a session.
///
/// Returns the first violation found.
pub fn validate_session(session: &Session) -> Result<(), ValidationError> {
    if session.id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }

    if session.history_segments.len() != session.history_actions.len() {
        return Err(ValidationError::HistoryLengthMismatch {
            segments: session.history_segments.len(),
            actions: session.history_actions.len(),
        });
    }

    if session.updated_at < session.created_at {
        return Err(ValidationError::TimestampsOutOfOrder);
    }

    validate_segment(&session.current_segment, session.mode, || "current".to_owned())?;
    for (i, segment) in session.history_segments.iter().enumerate() {
        validate_segment(segment, session.mode, || format!("history[{i}]"))?;
    }

    Ok(())
}

fn validate_segment(
    segment: &Segment,
    mode: SessionMode,
    position: impl Fn() -> String,
) -> Result<(), ValidationError> {
    if segment.id.is_empty() {
        return Err(ValidationError::EmptySegmentId {
            position: position(),
        });
    }

    if mode == SessionMode::Custom && !segment.choices.is_empty() {
        return Err(ValidationError::ChoicesInCustomMode {
            position: position(),
            count: segment.choices.len(),
        });
    }

    let mut seen = HashSet::with_capacity(segment.choices.len());
    for choice in &segment.choices {
        if !seen.insert(choice.id.as_str()) {
            return Err(ValidationError::DuplicateChoiceId {
                position: position(),
                choice_id: choice.id.to_string(),
            });
        }
    }

    Ok(())
}
