//! In-memory session store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use saga_core::{Session, SessionId};

use crate::errors::Result;
use crate::traits::SessionStore;

/// Process-local store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Synchronous read of a stored snapshot.
    pub fn snapshot(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Store a snapshot without counting it as a write.
    pub fn seed(&self, session: Session) {
        let _ = self.sessions.write().insert(session.id.clone(), session);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.snapshot(id))
    }

    async fn set(&self, session: &Session) -> Result<()> {
        let _ = self
            .sessions
            .write()
            .insert(session.id.clone(), session.clone());
        let _ = self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let _ = self.sessions.write().remove(id);
        Ok(())
    }
}
