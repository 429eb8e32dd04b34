//! # saga-store
//!
//! Durable key-value storage for session snapshots.
//!
//! - **[`SessionStore`]**: the `get` / `set` / `delete` contract the
//!   persistence coordinator writes through
//! - **[`MemoryStore`]**: process-local map, used in tests and ephemeral runs
//! - **[`SqliteStore`]**: `r2d2`-pooled `SQLite` file with versioned migrations

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use errors::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{SessionSummary, SqliteStore};
pub use traits::SessionStore;
