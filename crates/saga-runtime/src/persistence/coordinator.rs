//! Debounced, serialized, retried snapshot writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use saga_core::{Session, SessionId, validate_session};
use saga_store::{SessionStore, StoreError};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::conflict::{ConflictPolicy, Resolution};
use super::{PersistenceConfig, PersistenceEvent, WriteOutcome, WriteState};

/// Armed debounce timer and the snapshot it will write.
struct PendingWrite {
    generation: u64,
    session: Session,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn SessionStore>,
    config: PersistenceConfig,
    policy: ConflictPolicy,
    pending: DashMap<SessionId, PendingWrite>,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
    in_flight: DashMap<SessionId, usize>,
    events: broadcast::Sender<PersistenceEvent>,
    next_generation: AtomicU64,
}

/// Owns the per-session write lifecycle.
///
/// Writes for one session ID are totally ordered by a per-ID async lock;
/// different IDs never wait on each other. Dropping the coordinator cancels
/// every pending write, while writes already in flight run to completion.
pub struct PersistenceCoordinator {
    inner: Arc<Inner>,
}

impl PersistenceCoordinator {
    /// Create a coordinator writing to `store`.
    pub fn new(store: Arc<dyn SessionStore>, config: PersistenceConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let policy = ConflictPolicy::new(config.conflict_tolerance);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                policy,
                pending: DashMap::new(),
                locks: DashMap::new(),
                in_flight: DashMap::new(),
                events,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// The coordinator's configuration.
    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    /// Receive an event after every write, rejection and final failure.
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.inner.events.subscribe()
    }

    /// Arm a debounced write of `session`.
    ///
    /// A write already pending for the same ID is cancelled and its payload
    /// replaced, so a burst of calls produces one write of the last snapshot.
    /// Must be called within a Tokio runtime.
    pub fn schedule_write(&self, session: &Session) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let id = session.id.clone();

        // The entry guard is held until the new write is recorded, so the
        // timer task cannot observe the map before its own generation lands.
        match self.inner.pending.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let handle = spawn_debounced(Arc::clone(&self.inner), id, generation);
                let previous = entry.insert(PendingWrite {
                    generation,
                    session: session.clone(),
                    handle,
                });
                previous.handle.abort();
                debug!(session_id = %session.id, generation, "pending write replaced");
            }
            Entry::Vacant(entry) => {
                let handle = spawn_debounced(Arc::clone(&self.inner), id, generation);
                let _ = entry.insert(PendingWrite {
                    generation,
                    session: session.clone(),
                    handle,
                });
                debug!(session_id = %session.id, generation, "write scheduled");
            }
        }
    }

    /// Cancel any pending write for the ID and write `session` now.
    pub async fn write_now(&self, session: &Session) -> WriteOutcome {
        let _ = self.cancel_pending(&session.id);
        let _guard = InFlightGuard::enter(&self.inner, &session.id);
        self.inner.write(session).await
    }

    /// Write every pending snapshot now, in no particular order.
    pub async fn flush(&self) -> Vec<(SessionId, WriteOutcome)> {
        let ids: Vec<SessionId> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let Some((_, pending)) = self.inner.pending.remove(&id) else {
                continue;
            };
            pending.handle.abort();
            let _guard = InFlightGuard::enter(&self.inner, &id);
            let outcome = self.inner.write(&pending.session).await;
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Cancel the pending write for one ID. Returns whether one was pending.
    pub fn cancel_pending(&self, id: &SessionId) -> bool {
        match self.inner.pending.remove(id) {
            Some((_, pending)) => {
                pending.handle.abort();
                debug!(session_id = %id, "pending write cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending write. Returns how many were cancelled.
    pub fn cleanup(&self) -> usize {
        let mut cancelled = 0;
        self.inner.pending.retain(|_, pending| {
            pending.handle.abort();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            debug!(cancelled, "pending writes cancelled");
        }
        cancelled
    }

    /// Cancel any pending write and remove the stored snapshot.
    pub async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        let _ = self.cancel_pending(id);
        let result = {
            let _held = self.inner.lock(id).await;
            self.inner.store.delete(id).await
        };
        if result.is_ok() {
            info!(session_id = %id, "session deleted");
        }
        result
    }

    /// Lifecycle state of one session ID.
    pub fn write_state(&self, id: &SessionId) -> WriteState {
        if self.inner.in_flight.contains_key(id) {
            WriteState::InFlight
        } else if self.inner.pending.contains_key(id) {
            WriteState::Pending
        } else {
            WriteState::Unscheduled
        }
    }

    /// Number of armed debounce timers.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl Drop for PersistenceCoordinator {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn spawn_debounced(inner: Arc<Inner>, id: SessionId, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(inner.config.debounce).await;
        let _guard = InFlightGuard::enter(&inner, &id);
        // The payload is claimed under the lock; until then a later write_now
        // can still cancel it.
        let _held = inner.lock(&id).await;
        let Some((_, pending)) = inner
            .pending
            .remove_if(&id, |_, pending| pending.generation == generation)
        else {
            return;
        };
        let _ = inner.write_locked(&pending.session).await;
    })
}

impl Inner {
    async fn write(&self, session: &Session) -> WriteOutcome {
        let _held = self.lock(&session.id).await;
        self.write_locked(session).await
    }

    /// Validate and write. The caller holds the ID's lock.
    #[instrument(skip_all, fields(session_id = %session.id, turns = session.turn_count()))]
    async fn write_locked(&self, session: &Session) -> WriteOutcome {
        if let Err(e) = validate_session(session) {
            warn!(error = %e, "invalid snapshot not persisted");
            self.emit(PersistenceEvent::Rejected {
                session_id: session.id.clone(),
                reason: e.to_string(),
            });
            return WriteOutcome::Rejected(e);
        }
        self.write_with_retry(session).await
    }

    async fn write_with_retry(&self, session: &Session) -> WriteOutcome {
        let max_attempts = self.config.retry.max_attempts();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_write(session).await {
                Ok(resolution) => {
                    debug!(attempts = attempt, "snapshot written");
                    self.emit(PersistenceEvent::Written {
                        session_id: session.id.clone(),
                        resolution,
                    });
                    return WriteOutcome::Written {
                        resolution,
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry.delay_for(attempt - 1, rand::random());
                    debug!(attempt, delay_ms = delay.as_millis(), error = %e, "write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(attempts = attempt, error = %e, "snapshot write failed");
                    self.emit(PersistenceEvent::Failed {
                        session_id: session.id.clone(),
                        error: e.to_string(),
                        attempts: attempt,
                    });
                    return WriteOutcome::Failed {
                        attempts: attempt,
                        error: e,
                    };
                }
            }
        }
    }

    async fn try_write(&self, incoming: &Session) -> Result<Option<Resolution>, StoreError> {
        let stored = self.store.get(&incoming.id).await?;
        let Some(conflict) = stored
            .as_ref()
            .and_then(|stored| self.policy.detect(stored, incoming))
        else {
            self.store.set(incoming).await?;
            return Ok(None);
        };

        let resolution = conflict.resolve();
        warn!(
            stored_turns = conflict.stored.turn_count(),
            incoming_turns = conflict.incoming.turn_count(),
            resolution = resolution.as_str(),
            "snapshot conflict resolved"
        );
        self.store.set(conflict.winner()).await?;
        Ok(Some(resolution))
    }

    async fn lock(&self, id: &SessionId) -> HeldLock<'_> {
        let lock = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        HeldLock {
            inner: self,
            id: id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop the per-ID lock once nobody else holds or waits on it.
    fn release_lock(&self, id: &SessionId) {
        let _ = self
            .locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn emit(&self, event: PersistenceEvent) {
        let _ = self.events.send(event);
    }
}

/// Exclusive hold on one ID's write lock.
struct HeldLock<'a> {
    inner: &'a Inner,
    id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.inner.release_lock(&self.id);
    }
}

/// Marks an ID in flight for the guard's lifetime.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    id: SessionId,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a Inner, id: &SessionId) -> Self {
        *inner.in_flight.entry(id.clone()).or_insert(0) += 1;
        Self {
            inner,
            id: id.clone(),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .inner
            .in_flight
            .remove_if_mut(&self.id, |_, count| {
                *count -= 1;
                *count == 0
            });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
