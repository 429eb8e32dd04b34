//! Session engine.
//!
//! Owns the persistence coordinator and the budgeter configuration, and
//! sequences one turn: collected response → parsed segment → recorded turn
//! → immediate write. Parsing happens before any mutation, so a response
//! that fails to parse leaves the session untouched.

use std::sync::Arc;

use futures::Stream;
use saga_context::{BudgetInput, TokenBudgetResult, build_context};
use saga_core::{Choice, Session, SessionId, SessionMode};
use saga_store::{SessionStore, StoreError};
use saga_stream::parse_response;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::errors::{GenerationError, RuntimeError};
use crate::persistence::{PersistenceCoordinator, PersistenceEvent, WriteOutcome};
use crate::turn::stream::{CollectedResponse, StreamUpdate, collect_response};

/// Runs adventures against one store.
pub struct SessionEngine {
    coordinator: PersistenceCoordinator,
    config: EngineConfig,
}

impl SessionEngine {
    /// Create an engine writing through `store`.
    pub fn new(store: Arc<dyn SessionStore>, config: EngineConfig) -> Self {
        let coordinator = PersistenceCoordinator::new(store, config.persistence.clone());
        Self {
            coordinator,
            config,
        }
    }

    /// The persistence coordinator.
    pub fn coordinator(&self) -> &PersistenceCoordinator {
        &self.coordinator
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persistence events (the "save failed" surface).
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.coordinator.subscribe()
    }

    /// Consume a response stream with the configured delimiters.
    pub async fn collect<S>(
        &self,
        stream: S,
        cancel: &CancellationToken,
        updates: Option<&mpsc::UnboundedSender<StreamUpdate>>,
    ) -> Result<CollectedResponse, RuntimeError>
    where
        S: Stream<Item = Result<String, GenerationError>>,
    {
        collect_response(stream, &self.config.delimiters, cancel, updates).await
    }

    /// Start an adventure from its opening response and persist it.
    ///
    /// `custom_scene` is the player-written opening scene of a custom-mode
    /// adventure.
    #[instrument(skip_all, fields(mode = mode.as_str()))]
    pub async fn start_session(
        &self,
        mode: SessionMode,
        custom_scene: Option<String>,
        opening: CollectedResponse,
    ) -> Result<(Session, WriteOutcome), RuntimeError> {
        let reasoning = opening.reasoning_trace();
        let segment = parse_response(&opening.narrative, mode)?.into_segment(reasoning);
        let mut session = Session::new(mode, segment);
        if let Some(scene) = custom_scene.filter(|s| !s.trim().is_empty()) {
            session = session.with_custom_scene(scene);
        }
        info!(session_id = %session.id, "session started");

        let outcome = self.coordinator.write_now(&session).await;
        Ok((session, outcome))
    }

    /// Budgeted context for the prompt that will follow `action`.
    pub fn build_context(
        &self,
        session: &Session,
        action: &str,
        budget_tokens: usize,
    ) -> TokenBudgetResult {
        let input = BudgetInput::for_next_turn(session, action, budget_tokens);
        let result = build_context(&input, &self.config.budget);
        debug!(
            session_id = %session.id,
            budget_tokens,
            estimated = result.estimated_tokens,
            segments = result.segments_included,
            actions = result.actions_included,
            "context built"
        );
        result
    }

    /// Record the turn produced by `action` and persist it immediately.
    ///
    /// On a parse error the session is left unchanged.
    #[instrument(skip_all, fields(session_id = %session.id))]
    pub async fn complete_turn(
        &self,
        session: &mut Session,
        action: Choice,
        response: CollectedResponse,
    ) -> Result<WriteOutcome, RuntimeError> {
        let reasoning = response.reasoning_trace();
        let segment = parse_response(&response.narrative, session.mode)?.into_segment(reasoning);
        session.record_turn(action, segment);
        info!(
            turn = session.turn_count(),
            recovered = response.recovered,
            "turn completed"
        );
        Ok(self.coordinator.write_now(session).await)
    }

    /// Bump `updated_at` and schedule a debounced write.
    pub fn touch(&self, session: &mut Session) {
        session.touch();
        self.coordinator.schedule_write(session);
    }

    /// Attach a late-arriving illustration to the current segment.
    ///
    /// Returns `false` when one was already attached; nothing is written then.
    pub fn attach_illustration(&self, session: &mut Session, reference: impl Into<String>) -> bool {
        if !session.current_segment.attach_illustration(reference) {
            return false;
        }
        self.touch(session);
        true
    }

    /// Delete a session and any write pending for it.
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.coordinator.delete(id).await
    }

    /// Write everything pending, then tear down the coordinator's timers.
    pub async fn shutdown(&self) -> Vec<(SessionId, WriteOutcome)> {
        let flushed = self.coordinator.flush().await;
        let _ = self.coordinator.cleanup();
        info!(flushed = flushed.len(), "session engine shut down");
        flushed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use saga_store::MemoryStore;
    use saga_stream::ParseError;

    use super::*;
    use crate::persistence::WriteState;

    fn engine(store: Arc<MemoryStore>) -> SessionEngine {
        SessionEngine::new(store, EngineConfig::default())
    }

    fn opening() -> CollectedResponse {
        CollectedResponse::narrative_only(
            "STORY: You wake on a drifting raft.\nSCENE: open sea at dawn\nCHOICES:\n1. Paddle east\n2. Wait",
        )
    }

    #[tokio::test]
    async fn start_session_persists_opening() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let (session, outcome) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();

        assert!(outcome.is_written());
        assert_eq!(session.current_segment.text, "You wake on a drifting raft.");
        assert_eq!(session.current_segment.choices.len(), 2);
        assert_eq!(store.snapshot(&session.id), Some(session));
    }

    #[tokio::test]
    async fn custom_session_keeps_scene_and_drops_choices() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let (session, _) = engine
            .start_session(
                SessionMode::Custom,
                Some("A lighthouse in a storm".into()),
                opening(),
            )
            .await
            .unwrap();

        assert!(session.current_segment.choices.is_empty());
        assert_eq!(session.custom_scene.as_deref(), Some("A lighthouse in a storm"));
    }

    #[tokio::test]
    async fn complete_turn_records_and_writes() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let (mut session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();

        let action = session.current_segment.choices[0].clone();
        let mut response = CollectedResponse::narrative_only("STORY: The current pulls you east.");
        response.reasoning = "raise tension".into();
        let outcome = engine.complete_turn(&mut session, action, response).await.unwrap();

        assert!(outcome.is_written());
        assert_eq!(session.turn_count(), 1);
        assert_eq!(
            session.current_segment.reasoning.as_deref(),
            Some("raise tension")
        );
        assert_eq!(store.snapshot(&session.id).unwrap().turn_count(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn parse_failure_leaves_session_untouched() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let (mut session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();
        let before = session.clone();

        let err = engine
            .complete_turn(
                &mut session,
                Choice::new("Paddle east"),
                CollectedResponse::narrative_only("   "),
            )
            .await
            .unwrap_err();

        assert_matches!(err, RuntimeError::Parse(ParseError::EmptyResponse));
        assert_eq!(session, before);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn context_includes_history() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let (mut session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();
        let _ = engine
            .complete_turn(
                &mut session,
                Choice::new("Paddle east"),
                CollectedResponse::narrative_only("STORY: Gulls circle overhead."),
            )
            .await
            .unwrap();

        let context = engine.build_context(&session, "Wave at the gulls", 4_000);
        assert_eq!(context.previous_segment, "Gulls circle overhead.");
        assert_eq!(context.recent_action, "Wave at the gulls");
        assert_eq!(context.segments_included, 2);
        assert_eq!(context.actions_included, 2);
        assert!(context.context.contains("You wake on a drifting raft."));
        assert!(context.context.contains("Paddle east"));
        assert!(context.estimated_tokens <= 4_000);
    }

    #[tokio::test(start_paused = true)]
    async fn illustration_is_written_after_debounce() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let (mut session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();

        assert!(engine.attach_illustration(&mut session, "img://raft"));
        assert!(!engine.attach_illustration(&mut session, "img://other"));
        assert_eq!(engine.coordinator().write_state(&session.id), WriteState::Pending);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            store.snapshot(&session.id).unwrap().current_segment.illustration.as_deref(),
            Some("img://raft")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let (mut session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();
        engine.touch(&mut session);

        let flushed = engine.shutdown().await;
        assert_eq!(flushed.len(), 1);
        assert_eq!(store.write_count(), 2);
        assert_eq!(engine.coordinator().pending_count(), 0);
    }

    #[tokio::test]
    async fn delete_session_removes_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let (session, _) = engine
            .start_session(SessionMode::Standard, None, opening())
            .await
            .unwrap();

        engine.delete_session(&session.id).await.unwrap();
        assert!(store.is_empty());
    }
}
