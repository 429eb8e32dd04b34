//! Best-effort narrative recovery from an unterminated reasoning block.
//!
//! When a response opens a reasoning block and never closes it, the
//! classifier routes everything after the open marker to reasoning and no
//! narrative is emitted. Models that do this usually still wrote the story,
//! just inside the block. This module tries to find it:
//!
//! 1. If a labelled `STORY` section is present, everything from that label on
//!    is returned (the response parser then handles SCENE/CHOICES).
//! 2. Otherwise the trailing run of paragraphs that open like prose
//!    ("You", "Your", "The", a quotation mark, ...) and do not read like
//!    planning ("I should", "Let me", "the player") is returned.
//!
//! This is a heuristic. It may return nothing for a perfectly good story or
//! return planning text that happens to look like prose.

use std::sync::LazyLock;

use regex::Regex;

static STORY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*|__)?story(?:\*\*|__)?[ \t]*:")
        .expect("static regex")
});

static PROSE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:["“'‘]|(?:You|Your|The|As|With|Suddenly|Before|Behind|Above|Below|In|At|A|An)\b)"#)
        .expect("static regex")
});

static PLANNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:I should|I will|I'll|I need|let me|the player|the user|my response|the story should)\b")
        .expect("static regex")
});

/// Try to recover narrative text from unterminated reasoning.
pub fn recover_narrative(reasoning: &str) -> Option<String> {
    if let Some(m) = STORY_LABEL.find(reasoning) {
        let recovered = reasoning[m.start()..].trim();
        if !recovered.is_empty() {
            return Some(recovered.to_owned());
        }
    }

    let paragraphs: Vec<&str> = reasoning
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let tail: Vec<&str> = paragraphs
        .iter()
        .rev()
        .take_while(|p| looks_like_prose(p))
        .copied()
        .collect();

    if tail.is_empty() {
        return None;
    }
    Some(tail.into_iter().rev().collect::<Vec<_>>().join("\n\n"))
}

fn looks_like_prose(paragraph: &str) -> bool {
    PROSE_OPENER.is_match(paragraph) && !PLANNING.is_match(paragraph)
}
