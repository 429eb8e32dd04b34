//! Session, segment and choice model.
//!
//! A [`Session`] is one adventure. It holds the segment currently on screen
//! plus two parallel histories: the segments already played and the action
//! the player took after each of them. Both histories grow by exactly one
//! entry per turn via [`Session::record_turn`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChoiceId, SegmentId, SessionId};

/// How the adventure was started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Model-offered numbered choices each turn.
    #[default]
    Standard,
    /// Player writes every action; segments carry no choices.
    Custom,
}

impl SessionMode {
    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Custom => "custom",
        }
    }
}

/// A choice offered by the model, or an action the player took.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Choice ID.
    pub id: ChoiceId,
    /// Display text.
    pub text: String,
    /// Set when the player typed the action instead of picking a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_player_authored: Option<bool>,
}

impl Choice {
    /// A model-offered choice.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: ChoiceId::new(),
            text: text.into(),
            is_player_authored: None,
        }
    }

    /// An action written by the player.
    pub fn player_authored(text: impl Into<String>) -> Self {
        Self {
            id: ChoiceId::new(),
            text: text.into(),
            is_player_authored: Some(true),
        }
    }

    /// Whether the player wrote this action.
    pub fn is_player_authored(&self) -> bool {
        self.is_player_authored.unwrap_or(false)
    }
}

/// One unit of story: narrative text, scene metadata and follow-up choices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Segment ID.
    pub id: SegmentId,
    /// Narrative text shown to the player.
    pub text: String,
    /// Scene description (used for illustration prompts and context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    /// Reasoning trace split out of the response stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Choices offered after this segment. Empty in custom mode.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Late-arriving illustration reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustration: Option<String>,
}

impl Segment {
    /// Create a segment with the given narrative text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: SegmentId::new(),
            text: text.into(),
            scene: None,
            reasoning: None,
            choices: Vec::new(),
            illustration: None,
        }
    }

    /// Set the scene description.
    #[must_use]
    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    /// Set the reasoning trace.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Set the offered choices.
    #[must_use]
    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    /// Attach an illustration reference.
    ///
    /// The illustration is the only field that may change after creation and
    /// it may only be set once. Returns `false` if one was already attached.
    pub fn attach_illustration(&mut self, reference: impl Into<String>) -> bool {
        if self.illustration.is_some() {
            return false;
        }
        self.illustration = Some(reference.into());
        true
    }
}

/// An adventure session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// The segment currently being played.
    pub current_segment: Segment,
    /// Segments already played, oldest first.
    #[serde(default)]
    pub history_segments: Vec<Segment>,
    /// Action taken after each history segment, oldest first.
    #[serde(default)]
    pub history_actions: Vec<Choice>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Adventure mode.
    #[serde(default)]
    pub mode: SessionMode,
    /// Player-written opening scene (custom mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_scene: Option<String>,
}

impl Session {
    /// Start a new session with its opening segment.
    pub fn new(mode: SessionMode, opening: Segment) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            current_segment: opening,
            history_segments: Vec::new(),
            history_actions: Vec::new(),
            created_at: now,
            updated_at: now,
            mode,
            custom_scene: None,
        }
    }

    /// Set the custom opening scene.
    #[must_use]
    pub fn with_custom_scene(mut self, scene: impl Into<String>) -> Self {
        self.custom_scene = Some(scene.into());
        self
    }

    /// Advance one turn: the current segment and the action taken after it
    /// move into history and `next` becomes current.
    pub fn record_turn(&mut self, action: Choice, next: Segment) {
        let previous = std::mem::replace(&mut self.current_segment, next);
        self.history_segments.push(previous);
        self.history_actions.push(action);
        self.touch();
    }

    /// Bump `updated_at` to now, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Number of completed turns.
    pub fn turn_count(&self) -> usize {
        self.history_actions.len()
    }

    /// Scene text for the next prompt: the current segment's scene, falling
    /// back to the custom opening scene.
    pub fn scene_text(&self) -> &str {
        self.current_segment
            .scene
            .as_deref()
            .or(self.custom_scene.as_deref())
            .unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        let opening = Segment::new("You wake in a cold cellar.")
            .with_scene("A damp stone cellar lit by one candle")
            .with_reasoning("Open with tension.")
            .with_choices(vec![Choice::new("Climb the stairs"), Choice::new("Search")]);
        Session::new(SessionMode::Standard, opening)
    }

    #[test]
    fn new_session_has_empty_history() {
        let session = sample_session();
        assert!(session.history_segments.is_empty());
        assert!(session.history_actions.is_empty());
        assert_eq!(session.turn_count(), 0);
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn record_turn_moves_current_into_history() {
        let mut session = sample_session();
        let opening_id = session.current_segment.id.clone();
        let action = session.current_segment.choices[0].clone();

        session.record_turn(action.clone(), Segment::new("The stairs creak."));

        assert_eq!(session.history_segments.len(), 1);
        assert_eq!(session.history_actions.len(), 1);
        assert_eq!(session.history_segments[0].id, opening_id);
        assert_eq!(session.history_actions[0], action);
        assert_eq!(session.current_segment.text, "The stairs creak.");
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn illustration_attaches_once() {
        let mut segment = Segment::new("text");
        assert!(segment.attach_illustration("img-1"));
        assert!(!segment.attach_illustration("img-2"));
        assert_eq!(segment.illustration.as_deref(), Some("img-1"));
    }

    #[test]
    fn player_authored_flag() {
        assert!(Choice::player_authored("I dance").is_player_authored());
        assert!(!Choice::new("Run").is_player_authored());
    }

    #[test]
    fn scene_text_falls_back_to_custom_scene() {
        let session = Session::new(SessionMode::Custom, Segment::new("Begin."))
            .with_custom_scene("A lighthouse at dusk");
        assert_eq!(session.scene_text(), "A lighthouse at dusk");

        let session = sample_session();
        assert_eq!(session.scene_text(), "A damp stone cellar lit by one candle");
    }

    #[test]
    fn session_json_roundtrip() {
        let mut session = sample_session().with_custom_scene("unused");
        session.record_turn(Choice::player_authored("Hide"), Segment::new("Footsteps."));

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn segment_json_roundtrip() {
        let mut segment = Segment::new("A door.").with_scene("hallway");
        let _ = segment.attach_illustration("https://img/1.png");
        let json = serde_json::to_string(&segment).unwrap();
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn serialized_field_names_are_camel_case() {
        let session = sample_session();
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("currentSegment").is_some());
        assert!(value.get("historySegments").is_some());
        assert!(value.get("historyActions").is_some());
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["mode"], "standard");
        assert!(value.get("customScene").is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "id": "s1",
            "currentSegment": {"id": "g1", "text": "hi"},
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.mode, SessionMode::Standard);
        assert!(session.history_segments.is_empty());
        assert!(session.current_segment.choices.is_empty());
    }
}
