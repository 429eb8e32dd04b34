//! # saga-core
//!
//! Foundation types for the Saga session engine.
//!
//! This crate provides the shared vocabulary that all other Saga crates depend on:
//!
//! - **Branded IDs**: `SessionId`, `SegmentId`, `ChoiceId` as newtypes for type safety
//! - **Session model**: [`Session`], [`Segment`], [`Choice`] and the [`SessionMode`] tag
//! - **Validation**: structural invariants checked before anything is persisted
//! - **Retry math**: [`retry::RetryConfig`] and exponential backoff helpers
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod retry;
pub mod session;
pub mod validation;

pub use ids::{ChoiceId, SegmentId, SessionId};
pub use session::{Choice, Segment, Session, SessionMode};
pub use validation::{ValidationError, validate_session};
