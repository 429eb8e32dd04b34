//! # saga-runtime
//!
//! Glues the session engine together.
//!
//! - **[`persistence`]**: debounced, retried, conflict-resolving snapshot
//!   writes through a [`saga_store::SessionStore`]
//! - **[`turn`]**: drives a response stream through the classifier, parses
//!   the narrative into a segment and records the turn
//! - **[`config`]**: engine configuration derived from settings

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod persistence;
pub mod turn;

pub use config::EngineConfig;
pub use errors::{GenerationError, RuntimeError};
pub use persistence::{
    PersistenceConfig, PersistenceCoordinator, PersistenceEvent, Resolution, WriteOutcome,
    WriteState,
};
pub use turn::{CollectedResponse, SessionEngine, StreamUpdate, collect_response};
