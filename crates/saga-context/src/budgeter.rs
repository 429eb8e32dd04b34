//! Token-budgeted context assembly.
//!
//! ## Algorithm
//!
//! 1. Reserve the scaffold, the full most-recent action and a safety buffer.
//! 2. Split the remainder `R`: older history keeps a floor of
//!    `max(min_floor, ratio × R)`, clamped to `R / 2`; the most recent segment
//!    gets the rest (never less than `min_partial_tokens`).
//! 3. Truncate the most recent segment to its ceiling.
//! 4. Whatever the immediate context (scaffold, scene, recent segment, recent
//!    action) leaves of the budget goes to older history.
//! 5. Pack older segment/action pairs newest-first. The first pair that does
//!    not fit is included as a truncated segment if more than
//!    `min_partial_tokens` remain, then packing stops.
//! 6. Reassemble oldest-first.
//!
//! A final enforcement pass drops history, then shrinks the recent segment,
//! the action and the scene until the estimate fits. The estimate is the sum
//! of per-part estimates plus the scaffold, and zero for an empty result.

use std::collections::VecDeque;

use saga_core::Session;
use tracing::debug;

use crate::constants::{
    ACTION_PREFIX, DEFAULT_HISTORY_FLOOR_RATIO, DEFAULT_MIN_HISTORY_FLOOR_TOKENS,
    DEFAULT_MIN_PARTIAL_TOKENS, DEFAULT_SAFETY_BUFFER_TOKENS, ENTRY_OVERHEAD_TOKENS,
    ENTRY_SEPARATOR, HISTORY_HEADER, RECENT_ACTION_HEADER, RECENT_SEGMENT_HEADER,
    SCAFFOLD_TOKENS, SCENE_HEADER, SECTION_SEPARATOR,
};
use crate::token_estimator::{estimate_tokens, truncate_to_tokens};

/// Tunables for [`build_context`].
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetConfig {
    /// Held back from the immediate-context allotment.
    pub safety_buffer_tokens: usize,
    /// Absolute history floor.
    pub min_history_floor_tokens: usize,
    /// Proportional history floor (fraction of the remaining budget).
    pub history_floor_ratio: f64,
    /// Smallest remainder worth a truncated history segment.
    pub min_partial_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            safety_buffer_tokens: DEFAULT_SAFETY_BUFFER_TOKENS,
            min_history_floor_tokens: DEFAULT_MIN_HISTORY_FLOOR_TOKENS,
            history_floor_ratio: DEFAULT_HISTORY_FLOOR_RATIO,
            min_partial_tokens: DEFAULT_MIN_PARTIAL_TOKENS,
        }
    }
}

/// Borrowed history to budget.
///
/// The last segment and the last action are the immediate context. Every
/// other segment is paired with the action at the same index, provided that
/// action is not the last one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetInput<'a> {
    /// Segment texts, oldest first.
    pub segments: Vec<&'a str>,
    /// Action texts, oldest first.
    pub actions: Vec<&'a str>,
    /// Current scene description.
    pub scene: &'a str,
    /// Total token budget.
    pub budget_tokens: usize,
}

impl<'a> BudgetInput<'a> {
    /// Build an input from raw parts.
    pub fn new(
        segments: Vec<&'a str>,
        actions: Vec<&'a str>,
        scene: &'a str,
        budget_tokens: usize,
    ) -> Self {
        Self {
            segments,
            actions,
            scene,
            budget_tokens,
        }
    }

    /// Input for the prompt that follows `session`, given the action the
    /// player just took.
    pub fn for_next_turn(session: &'a Session, action: &'a str, budget_tokens: usize) -> Self {
        let segments = session
            .history_segments
            .iter()
            .chain(std::iter::once(&session.current_segment))
            .map(|s| s.text.as_str())
            .collect();
        let actions = session
            .history_actions
            .iter()
            .map(|a| a.text.as_str())
            .chain(std::iter::once(action))
            .collect();
        Self {
            segments,
            actions,
            scene: session.scene_text(),
            budget_tokens,
        }
    }

    /// Estimate of the untruncated context.
    pub fn full_tokens(&self) -> usize {
        let recent_segment = self.segments.last().copied().unwrap_or_default();
        let recent_action = self.actions.last().copied().unwrap_or_default();
        let history: usize = self
            .older_entries()
            .map(|(segment, action)| entry_tokens(segment, action))
            .sum();
        let parts = estimate_tokens(self.scene)
            + estimate_tokens(recent_segment)
            + estimate_tokens(recent_action)
            + history;
        let empty = self.scene.is_empty()
            && recent_segment.is_empty()
            && recent_action.is_empty()
            && self.segments.len() <= 1;
        if empty { 0 } else { SCAFFOLD_TOKENS + parts }
    }

    /// Older segment/action pairs, oldest first.
    fn older_entries(&self) -> impl DoubleEndedIterator<Item = (&'a str, Option<&'a str>)> + '_ {
        let older = self.segments.len().saturating_sub(1);
        let paired = self.actions.len().saturating_sub(1);
        (0..older).map(move |i| (self.segments[i], (i < paired).then(|| self.actions[i])))
    }
}

/// Context selected for one prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenBudgetResult {
    /// Older history, oldest first.
    pub context: String,
    /// Most recent segment, possibly truncated.
    pub previous_segment: String,
    /// Most recent action.
    pub recent_action: String,
    /// Scene description used.
    pub scene: String,
    /// Segments included, the previous segment among them.
    pub segments_included: usize,
    /// Actions included, the recent action among them.
    pub actions_included: usize,
    /// Estimated size, never above the budget.
    pub estimated_tokens: usize,
}

impl TokenBudgetResult {
    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
            && self.previous_segment.is_empty()
            && self.recent_action.is_empty()
            && self.scene.is_empty()
    }

    /// Render the prompt context block. Empty sections are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (header, body) in [
            (SCENE_HEADER, &self.scene),
            (HISTORY_HEADER, &self.context),
            (RECENT_SEGMENT_HEADER, &self.previous_segment),
            (RECENT_ACTION_HEADER, &self.recent_action),
        ] {
            if body.is_empty() {
                continue;
            }
            out.push_str(header);
            out.push_str(body);
            out.push_str(SECTION_SEPARATOR);
        }
        out
    }
}

/// Select the context for one prompt within `input.budget_tokens`.
pub fn build_context(input: &BudgetInput<'_>, config: &BudgetConfig) -> TokenBudgetResult {
    let budget = input.budget_tokens;
    let recent_segment = input.segments.last().copied().unwrap_or_default();
    let recent_action = input.actions.last().copied().unwrap_or_default();

    let reserve =
        SCAFFOLD_TOKENS + estimate_tokens(recent_action) + config.safety_buffer_tokens;
    let remaining = budget.saturating_sub(reserve);
    let floor = history_floor(remaining, config);
    let ceiling = (remaining - floor).max(config.min_partial_tokens);

    let previous_segment = truncate_to_tokens(recent_segment, ceiling);
    let recent_truncated = previous_segment.len() != recent_segment.len();

    let immediate = SCAFFOLD_TOKENS
        + estimate_tokens(input.scene)
        + estimate_tokens(&previous_segment)
        + estimate_tokens(recent_action);
    let mut history_budget = budget.saturating_sub(immediate);

    let mut packed = VecDeque::new();
    for (segment, action) in input.older_entries().rev() {
        let cost = entry_tokens(segment, action);
        if cost <= history_budget {
            history_budget -= cost;
            packed.push_front(HistoryEntry {
                segment: segment.to_owned(),
                action: action.map(str::to_owned),
            });
            continue;
        }
        if history_budget > config.min_partial_tokens.max(ENTRY_OVERHEAD_TOKENS) {
            let partial = truncate_to_tokens(segment, history_budget - ENTRY_OVERHEAD_TOKENS);
            if !partial.is_empty() {
                packed.push_front(HistoryEntry {
                    segment: partial,
                    action: None,
                });
            }
        }
        break;
    }

    let mut assembly = Assembly {
        scene: input.scene.to_owned(),
        history: packed,
        recent_segment_included: !input.segments.is_empty()
            && (recent_segment.is_empty() || !previous_segment.is_empty()),
        recent_action_included: !input.actions.is_empty(),
        recent_segment: previous_segment,
        recent_action: recent_action.to_owned(),
    };
    assembly.enforce(budget);
    let result = assembly.into_result();

    debug!(
        budget,
        reserve,
        ceiling,
        recent_truncated,
        segments_included = result.segments_included,
        segments_total = input.segments.len(),
        estimated = result.estimated_tokens,
        "context assembled"
    );
    result
}

/// History floor for a remaining budget, clamped to half of it.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn history_floor(remaining: usize, config: &BudgetConfig) -> usize {
    let proportional = (remaining as f64 * config.history_floor_ratio).floor() as usize;
    proportional
        .max(config.min_history_floor_tokens)
        .min(remaining / 2)
}

fn entry_tokens(segment: &str, action: Option<&str>) -> usize {
    estimate_tokens(segment) + action.map_or(0, estimate_tokens) + ENTRY_OVERHEAD_TOKENS
}

struct HistoryEntry {
    segment: String,
    action: Option<String>,
}

impl HistoryEntry {
    fn tokens(&self) -> usize {
        entry_tokens(&self.segment, self.action.as_deref())
    }
}

struct Assembly {
    scene: String,
    history: VecDeque<HistoryEntry>,
    recent_segment: String,
    recent_segment_included: bool,
    recent_action: String,
    recent_action_included: bool,
}

impl Assembly {
    fn estimate(&self) -> usize {
        if self.scene.is_empty()
            && self.history.is_empty()
            && self.recent_segment.is_empty()
            && self.recent_action.is_empty()
        {
            return 0;
        }
        SCAFFOLD_TOKENS
            + estimate_tokens(&self.scene)
            + estimate_tokens(&self.recent_segment)
            + estimate_tokens(&self.recent_action)
            + self.history.iter().map(HistoryEntry::tokens).sum::<usize>()
    }

    fn overrun(&self, budget: usize) -> Option<usize> {
        self.estimate().checked_sub(budget).filter(|&over| over > 0)
    }

    fn enforce(&mut self, budget: usize) {
        while self.overrun(budget).is_some() && self.history.pop_front().is_some() {}

        if let Some(over) = self.overrun(budget) {
            if shrink(&mut self.recent_segment, over) {
                self.recent_segment_included = false;
            }
        }
        if let Some(over) = self.overrun(budget) {
            if shrink(&mut self.recent_action, over) {
                self.recent_action_included = false;
            }
        }
        if let Some(over) = self.overrun(budget) {
            let _ = shrink(&mut self.scene, over);
        }
        debug_assert!(self.estimate() <= budget);
    }

    fn into_result(self) -> TokenBudgetResult {
        let estimated_tokens = self.estimate();
        let segments_included = self.history.len() + usize::from(self.recent_segment_included);
        let actions_included = self.history.iter().filter(|e| e.action.is_some()).count()
            + usize::from(self.recent_action_included);

        let context = self
            .history
            .into_iter()
            .map(|entry| match entry.action {
                Some(action) => format!("{}{ACTION_PREFIX}{action}", entry.segment),
                None => entry.segment,
            })
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR);

        TokenBudgetResult {
            context,
            previous_segment: self.recent_segment,
            recent_action: self.recent_action,
            scene: self.scene,
            segments_included,
            actions_included,
            estimated_tokens,
        }
    }
}

/// Shrink `text` by at least `over` tokens. Returns `true` if non-empty text
/// was emptied.
fn shrink(text: &mut String, over: usize) -> bool {
    let had_text = !text.is_empty();
    let target = estimate_tokens(text).saturating_sub(over);
    *text = truncate_to_tokens(text, target);
    had_text && text.is_empty()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
