//! End-to-end turn flow: fragment stream → segment → session → `SQLite`.

use std::sync::Arc;

use assert_matches::assert_matches;
use async_stream::stream;
use futures::Stream;
use saga_core::{Choice, SessionMode};
use saga_runtime::{
    EngineConfig, GenerationError, PersistenceEvent, RuntimeError, SessionEngine, StreamUpdate,
};
use saga_store::{SessionStore, SqliteStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn chunked(text: &str, size: usize) -> impl Stream<Item = Result<String, GenerationError>> {
    let chars: Vec<char> = text.chars().collect();
    let parts: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
    stream! {
        for part in parts {
            yield Ok(part);
        }
    }
}

const OPENING: &str = "<think>Start somewhere unsettling.</think>STORY: The elevator stops between floors.\nSCENE: a dim elevator car\nCHOICES:\n1. Press the alarm\n2. Pry the doors";

const SECOND: &str = "<think>Reward curiosity.</think>**STORY:** The doors part onto a floor that is not on the panel.\n**CHOICES:**\n1. Step out\n2. Stay inside";

#[tokio::test]
async fn streamed_turns_are_persisted_to_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saga.db");
    let store = SqliteStore::open(&path).unwrap();
    let engine = SessionEngine::new(Arc::new(store.clone()), EngineConfig::default());
    let mut events = engine.subscribe();
    let cancel = CancellationToken::new();

    let opening = engine.collect(chunked(OPENING, 3), &cancel, None).await.unwrap();
    assert_eq!(opening.reasoning, "Start somewhere unsettling.");
    let (mut session, outcome) = engine
        .start_session(SessionMode::Standard, None, opening)
        .await
        .unwrap();
    assert!(outcome.is_written());
    assert_eq!(session.current_segment.choices.len(), 2);
    assert_eq!(session.scene_text(), "a dim elevator car");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let second = engine.collect(chunked(SECOND, 5), &cancel, Some(&tx)).await.unwrap();
    drop(tx);
    let mut narrative = String::new();
    while let Some(update) = rx.recv().await {
        if let StreamUpdate::Narrative(delta) = update {
            narrative.push_str(&delta);
        }
    }
    assert_eq!(narrative, second.narrative);

    let action = session.current_segment.choices[1].clone();
    let outcome = engine.complete_turn(&mut session, action, second).await.unwrap();
    assert!(outcome.is_written());

    drop(engine);
    let reopened = SqliteStore::open(&path).unwrap();
    let stored = reopened.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored, session);
    assert_eq!(stored.history_actions[0].text, "Pry the doors");
    assert_eq!(
        stored.current_segment.text,
        "The doors part onto a floor that is not on the panel."
    );

    let summaries = reopened.list_sessions(None).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].turn_count, 1);

    for _ in 0..2 {
        assert_matches!(events.try_recv(), Ok(PersistenceEvent::Written { resolution: None, .. }));
    }
}

#[tokio::test]
async fn custom_mode_turn_recovers_unterminated_reasoning() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = SessionEngine::new(store.clone(), EngineConfig::default());
    let cancel = CancellationToken::new();

    let opening = engine
        .collect(chunked("STORY: Fog rolls over the harbour.", 4), &cancel, None)
        .await
        .unwrap();
    let (mut session, _) = engine
        .start_session(SessionMode::Custom, Some("A harbour at night".into()), opening)
        .await
        .unwrap();

    let broken = "<think>I should describe the ship first.\n\nThe ship's bell rings once, though no one stands near it.";
    let response = engine.collect(chunked(broken, 6), &cancel, None).await.unwrap();
    assert!(response.recovered);

    let _ = engine
        .complete_turn(&mut session, Choice::player_authored("I ring the bell back"), response)
        .await
        .unwrap();
    assert_eq!(
        session.current_segment.text,
        "The ship's bell rings once, though no one stands near it."
    );
    assert!(session.history_actions[0].is_player_authored());

    let context = engine.build_context(&session, "I board the ship", 200);
    assert!(context.estimated_tokens <= 200);
    assert_eq!(context.scene, "A harbour at night");

    let stored = store.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.turn_count(), 1);
}

#[tokio::test]
async fn failed_generation_leaves_session_unchanged() {
    let engine = SessionEngine::new(
        Arc::new(SqliteStore::in_memory().unwrap()),
        EngineConfig::default(),
    );
    let cancel = CancellationToken::new();
    let opening = engine
        .collect(chunked(OPENING, 16), &cancel, None)
        .await
        .unwrap();
    let (session, _) = engine
        .start_session(SessionMode::Standard, None, opening)
        .await
        .unwrap();
    let before = session.clone();

    let failing = stream! {
        yield Ok("STORY: The li".to_owned());
        yield Err(GenerationError::RateLimited);
    };
    let err = engine.collect(failing, &cancel, None).await.unwrap_err();
    assert_matches!(err, RuntimeError::Generation(GenerationError::RateLimited));
    assert!(err.is_recoverable());
    assert_eq!(session, before);
}
