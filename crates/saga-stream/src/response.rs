//! Structured response parser.
//!
//! The narrative half of a response is expected to look like:
//!
//! ```text
//! STORY: You step into the hall...
//! SCENE: A torch-lit hall with banners
//! CHOICES:
//! 1. Approach the throne
//! 2. Hide behind a pillar
//! ```
//!
//! Labels are case-insensitive and may carry markdown (`**Story:**`,
//! `## Scene`). Missing labels never fail the parse: text before the first
//! label is the story, and a trailing numbered list in an unlabelled story
//! becomes the choices.

use std::sync::LazyLock;

use regex::Regex;
use saga_core::session::{Choice, Segment, SessionMode};
use tracing::debug;

use crate::errors::ParseError;

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+(.+?)\s*$").expect("static regex")
});

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+(.+?)\s*$").expect("static regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Story,
    Scene,
    Choices,
}

impl Section {
    fn label(self) -> &'static str {
        match self {
            Self::Story => "STORY",
            Self::Scene => "SCENE",
            Self::Choices => "CHOICES",
        }
    }
}

/// Sections extracted from a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Story text.
    pub story: String,
    /// Scene description, if one was given.
    pub scene: Option<String>,
    /// Choice texts in order. Always empty in custom mode.
    pub choices: Vec<String>,
}

impl ParsedResponse {
    /// Build a fresh segment, attaching the reasoning trace when non-empty.
    pub fn into_segment(self, reasoning: Option<String>) -> Segment {
        let mut segment = Segment::new(self.story)
            .with_choices(self.choices.into_iter().map(Choice::new).collect());
        segment.scene = self.scene;
        segment.reasoning = reasoning.filter(|r| !r.trim().is_empty());
        segment
    }
}

/// Parse the narrative text of one response.
pub fn parse_response(text: &str, mode: SessionMode) -> Result<ParsedResponse, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let mut preamble: Vec<&str> = Vec::new();
    let mut story: Vec<&str> = Vec::new();
    let mut scene: Vec<&str> = Vec::new();
    let mut choice_lines: Vec<&str> = Vec::new();
    let mut present: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some((section, inline)) = parse_label(line) {
            current = Some(section);
            if !present.contains(&section) {
                present.push(section);
            }
            if inline.is_empty() {
                continue;
            }
            match section {
                Section::Story => story.push(inline),
                Section::Scene => scene.push(inline),
                Section::Choices => choice_lines.push(inline),
            }
            continue;
        }
        match current {
            None => preamble.push(line),
            Some(Section::Story) => story.push(line),
            Some(Section::Scene) => scene.push(line),
            Some(Section::Choices) => choice_lines.push(line),
        }
    }

    let mut story_text = join_trimmed(&story);
    if story_text.is_empty() {
        story_text = join_trimmed(&preamble);
    }
    let scene_text = Some(join_trimmed(&scene)).filter(|s| !s.is_empty());
    let mut choices = extract_choices(&choice_lines);

    if !present.contains(&Section::Choices) && mode == SessionMode::Standard {
        if let Some((body, trailing)) = split_trailing_list(&story_text) {
            debug!(count = trailing.len(), "extracted unlabelled choices from story");
            story_text = body;
            choices = trailing;
        }
    }

    if story_text.is_empty() {
        let sections = present
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ParseError::EmptyStory { sections });
    }

    if mode == SessionMode::Custom {
        choices.clear();
    }

    Ok(ParsedResponse {
        story: story_text,
        scene: scene_text,
        choices,
    })
}

/// Recognise a section label line, returning the section and any inline text.
fn parse_label(line: &str) -> Option<(Section, &str)> {
    let mut rest = line.trim_start();
    let heading = rest.starts_with('#');
    rest = rest.trim_start_matches('#').trim_start();
    let emphasised = rest.starts_with("**") || rest.starts_with("__");
    rest = rest.trim_start_matches(['*', '_']);

    let word_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
    let word = &rest[..word_len];
    let section = match word.to_ascii_lowercase().as_str() {
        "story" => Section::Story,
        "scene" => Section::Scene,
        "choices" | "options" => Section::Choices,
        _ => return None,
    };

    rest = rest[word_len..].trim_start_matches(['*', '_', ' ', '\t']);
    if let Some(after) = rest.strip_prefix(':') {
        return Some((section, after.trim_start_matches(['*', '_']).trim()));
    }
    let shouted = word.bytes().all(|b| b.is_ascii_uppercase());
    if (heading || emphasised || shouted) && rest.trim().is_empty() {
        return Some((section, ""));
    }
    None
}

fn join_trimmed(lines: &[&str]) -> String {
    lines.join("\n").trim().to_owned()
}

fn clean_choice(text: &str) -> String {
    text.trim().trim_matches(['*', '_']).trim().to_owned()
}

fn extract_choices(lines: &[&str]) -> Vec<String> {
    let items: Vec<String> = lines
        .iter()
        .filter_map(|line| LIST_ITEM.captures(line))
        .map(|caps| clean_choice(&caps[1]))
        .filter(|c| !c.is_empty())
        .collect();
    if !items.is_empty() {
        return items;
    }
    // No list markers: one choice per non-empty line
    lines
        .iter()
        .map(|line| clean_choice(line))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Split a trailing numbered list (at least two items) off the story.
fn split_trailing_list(story: &str) -> Option<(String, Vec<String>)> {
    let lines: Vec<&str> = story.lines().collect();
    let mut start = lines.len();
    let mut items = Vec::new();
    for (i, line) in lines.iter().enumerate().rev() {
        if line.trim().is_empty() {
            continue;
        }
        match NUMBERED_ITEM.captures(line) {
            Some(caps) => {
                items.push(clean_choice(&caps[1]));
                start = i;
            }
            None => break,
        }
    }
    if items.len() < 2 {
        return None;
    }
    let body = join_trimmed(&lines[..start]);
    if body.is_empty() {
        return None;
    }
    items.reverse();
    Some((body, items))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const FULL: &str = "STORY: You step into the hall.\nTorches flicker.\n\nSCENE: A torch-lit hall\nCHOICES:\n1. Approach the throne\n2) Hide behind a pillar\n- Call out";

    #[test]
    fn parses_all_sections() {
        let parsed = parse_response(FULL, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, "You step into the hall.\nTorches flicker.");
        assert_eq!(parsed.scene.as_deref(), Some("A torch-lit hall"));
        assert_eq!(
            parsed.choices,
            vec!["Approach the throne", "Hide behind a pillar", "Call out"]
        );
    }

    #[test]
    fn markdown_labels() {
        let text = "**Story:** The gate opens.\n\n## Scene\nA misty courtyard\n\n**CHOICES**\n1. **Enter**\n2. Leave";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, "The gate opens.");
        assert_eq!(parsed.scene.as_deref(), Some("A misty courtyard"));
        assert_eq!(parsed.choices, vec!["Enter", "Leave"]);
    }

    #[test]
    fn unlabelled_text_is_story() {
        let parsed = parse_response("  Rain falls on the city.  ", SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, "Rain falls on the city.");
        assert!(parsed.scene.is_none());
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn unlabelled_trailing_list_becomes_choices() {
        let text = "The path forks.\n\n1. Go left\n2. Go right";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, "The path forks.");
        assert_eq!(parsed.choices, vec!["Go left", "Go right"]);
    }

    #[test]
    fn single_trailing_item_stays_in_story() {
        let text = "You count the doors.\n1. Only one.";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, text);
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn prose_starting_with_label_word_is_not_a_label() {
        let text = "Story time is over, the bard says.\nScenes blur together.";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, text);
    }

    #[test]
    fn preamble_used_when_story_label_missing() {
        let text = "The ship lists to port.\nSCENE: a sinking galleon\nCHOICES:\n1. Swim\n2. Pray";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.story, "The ship lists to port.");
        assert_eq!(parsed.choices.len(), 2);
    }

    #[test]
    fn choices_without_markers_split_by_line() {
        let text = "STORY: x\nCHOICES:\nRun away\nStand firm\n";
        let parsed = parse_response(text, SessionMode::Standard).unwrap();
        assert_eq!(parsed.choices, vec!["Run away", "Stand firm"]);
    }

    #[test]
    fn custom_mode_drops_choices() {
        let parsed = parse_response(FULL, SessionMode::Custom).unwrap();
        assert!(parsed.choices.is_empty());
        assert_eq!(parsed.scene.as_deref(), Some("A torch-lit hall"));
    }

    #[test]
    fn empty_response_errors() {
        assert_eq!(
            parse_response(" \n\t", SessionMode::Standard),
            Err(ParseError::EmptyResponse)
        );
    }

    #[test]
    fn sections_without_story_error() {
        let err = parse_response("SCENE: a cave\nCHOICES:\n1. Enter", SessionMode::Standard);
        assert_matches!(err, Err(ParseError::EmptyStory { sections }) if sections == "SCENE, CHOICES");
    }

    #[test]
    fn into_segment_carries_everything() {
        let parsed = parse_response(FULL, SessionMode::Standard).unwrap();
        let segment = parsed.into_segment(Some("keep it tense".into()));
        assert_eq!(segment.choices.len(), 3);
        assert_eq!(segment.choices[0].text, "Approach the throne");
        assert_eq!(segment.reasoning.as_deref(), Some("keep it tense"));
        assert_eq!(segment.scene.as_deref(), Some("A torch-lit hall"));
    }

    #[test]
    fn into_segment_drops_blank_reasoning() {
        let parsed = parse_response("Plain.", SessionMode::Standard).unwrap();
        let segment = parsed.into_segment(Some("  ".into()));
        assert!(segment.reasoning.is_none());
    }
}
