//! Token estimation and budget-aware truncation.
//!
//! ## Formula
//!
//! `tokens = ceil(bytes / 4)`. Byte length rather than char count keeps the
//! estimate conservative for multi-byte text.

use crate::constants::{CHARS_PER_TOKEN, TRUNCATION_MARKER};

/// Estimate tokens for a piece of text.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Longest prefix of `s` of at most `max_bytes` bytes that ends on a char
/// boundary.
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Fit `text` into `max_tokens`.
///
/// Text that already fits is returned unchanged. Otherwise the text is cut at
/// a char boundary and [`TRUNCATION_MARKER`] appended, with the marker counted
/// against the budget. Returns an empty string when not even the marker and
/// one character fit.
#[must_use]
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_owned();
    }
    let max_bytes = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let Some(body_budget) = max_bytes.checked_sub(TRUNCATION_MARKER.len()) else {
        return String::new();
    };
    let body = truncate_str(text, body_budget);
    if body.is_empty() {
        return String::new();
    }
    format!("{body}{TRUNCATION_MARKER}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
