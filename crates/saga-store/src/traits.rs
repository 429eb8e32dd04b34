//! Storage contract.

use async_trait::async_trait;
use saga_core::{Session, SessionId};

use crate::errors::Result;

/// Durable key-value storage of session snapshots, keyed by session ID.
///
/// Implementations store whatever they are given; validation and conflict
/// resolution happen in the caller.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored snapshot, if any.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Store `session`, replacing any snapshot with the same ID.
    async fn set(&self, session: &Session) -> Result<()>;

    /// Remove the snapshot. Deleting a missing ID is not an error.
    async fn delete(&self, id: &SessionId) -> Result<()>;
}
