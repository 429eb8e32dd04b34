//! Incremental reasoning/narrative classifier.
//!
//! One [`StreamClassifier`] handles one response. It is a three-state machine
//! (`BeforeBlock` → `InsideBlock` → `AfterBlock`) over a small pending buffer.
//! Text is released as soon as it provably cannot be part of a delimiter; only
//! a buffer tail that is a proper prefix of a delimiter is held back, so the
//! held text never exceeds the longest delimiter.
//!
//! The output is split-invariant: for any partition of a response into
//! fragments, the concatenated narrative and reasoning (including the final
//! [`StreamClassifier::finish`] flush) are the same as for the whole response
//! in one fragment.

use tracing::{debug, trace};

use crate::delimiters::ReasoningDelimiters;

/// Classifier position relative to the reasoning block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// No open delimiter seen yet.
    BeforeBlock,
    /// Between the open and close delimiters.
    InsideBlock,
    /// Block closed; everything else is narrative.
    AfterBlock,
}

/// Output of one classifier step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassifiedChunk {
    /// Narrative text released by this step.
    pub narrative: String,
    /// Reasoning text released by this step.
    pub reasoning: String,
}

impl ClassifiedChunk {
    /// Whether nothing was released.
    pub fn is_empty(&self) -> bool {
        self.narrative.is_empty() && self.reasoning.is_empty()
    }

    /// Append another step's output.
    pub fn append(&mut self, other: &ClassifiedChunk) {
        self.narrative.push_str(&other.narrative);
        self.reasoning.push_str(&other.reasoning);
    }
}

/// Snapshot of classifier progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierState {
    /// All reasoning seen so far, including any held partial tail.
    pub accumulated_reasoning: String,
    /// Open delimiter seen, close not yet.
    pub is_inside_block: bool,
    /// Close delimiter seen.
    pub is_block_complete: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Open,
    Close,
}

/// Splits one response stream into narrative and reasoning.
///
/// Holds mutable buffers; use one instance per concurrent response.
#[derive(Debug, Clone)]
pub struct StreamClassifier {
    delimiters: ReasoningDelimiters,
    state: BlockState,
    pending: String,
    reasoning: String,
}

impl Default for StreamClassifier {
    fn default() -> Self {
        Self::new(ReasoningDelimiters::default())
    }
}

impl StreamClassifier {
    /// Create a classifier for the given markers.
    pub fn new(delimiters: ReasoningDelimiters) -> Self {
        Self {
            delimiters,
            state: BlockState::BeforeBlock,
            pending: String::new(),
            reasoning: String::new(),
        }
    }

    /// Feed one fragment and return whatever can be released.
    pub fn process_chunk(&mut self, fragment: &str) -> ClassifiedChunk {
        let mut out = ClassifiedChunk::default();
        if fragment.is_empty() {
            return out;
        }
        if self.state == BlockState::AfterBlock {
            out.narrative.push_str(fragment);
            return out;
        }
        self.pending.push_str(fragment);
        self.drain(&mut out, false);
        out
    }

    /// Release any held partial-delimiter tail at end of stream.
    ///
    /// Held text is narrative before the block and reasoning inside an
    /// unterminated block. The state is left as is, so an unterminated block
    /// still reports `is_inside_block`.
    pub fn finish(&mut self) -> ClassifiedChunk {
        let mut out = ClassifiedChunk::default();
        self.drain(&mut out, true);
        out
    }

    /// Current progress.
    pub fn state(&self) -> ClassifierState {
        let mut accumulated_reasoning = self.reasoning.clone();
        if self.state == BlockState::InsideBlock {
            accumulated_reasoning.push_str(&self.pending);
        }
        ClassifierState {
            accumulated_reasoning,
            is_inside_block: self.state == BlockState::InsideBlock,
            is_block_complete: self.state == BlockState::AfterBlock,
        }
    }

    /// Current state-machine position.
    pub fn block_state(&self) -> BlockState {
        self.state
    }

    /// Clear all buffers for reuse on a new response.
    pub fn reset(&mut self) {
        self.state = BlockState::BeforeBlock;
        self.pending.clear();
        self.reasoning.clear();
    }

    fn drain(&mut self, out: &mut ClassifiedChunk, at_end: bool) {
        loop {
            match self.state {
                BlockState::BeforeBlock => {
                    let lower = self.pending.to_ascii_lowercase();
                    let hold = if at_end {
                        0
                    } else {
                        partial_suffix_len(
                            &lower,
                            &[self.delimiters.open(), self.delimiters.close()],
                        )
                    };
                    let hold_start = self.pending.len() - hold;

                    match self.earliest_marker(&lower) {
                        // A match overlapping a still-open partial could be
                        // the start of a longer marker; wait for more input.
                        Some((idx, marker)) if at_end || idx < hold_start => {
                            out.narrative.push_str(&self.pending[..idx]);
                            match marker {
                                Marker::Open => {
                                    self.pending
                                        .replace_range(..idx + self.delimiters.open().len(), "");
                                    self.state = BlockState::InsideBlock;
                                    trace!("reasoning block opened");
                                }
                                Marker::Close => {
                                    self.pending
                                        .replace_range(..idx + self.delimiters.close().len(), "");
                                    debug!("stripped orphan close delimiter");
                                }
                            }
                        }
                        _ => {
                            out.narrative.push_str(&self.pending[..hold_start]);
                            self.pending.replace_range(..hold_start, "");
                            return;
                        }
                    }
                }
                BlockState::InsideBlock => {
                    let lower = self.pending.to_ascii_lowercase();
                    if let Some(idx) = lower.find(self.delimiters.close()) {
                        let slice = &self.pending[..idx];
                        out.reasoning.push_str(slice);
                        self.reasoning.push_str(slice);
                        out.narrative
                            .push_str(&self.pending[idx + self.delimiters.close().len()..]);
                        self.pending.clear();
                        self.state = BlockState::AfterBlock;
                        trace!(reasoning_len = self.reasoning.len(), "reasoning block closed");
                        return;
                    }
                    let hold = if at_end {
                        0
                    } else {
                        partial_suffix_len(&lower, &[self.delimiters.close()])
                    };
                    let release = self.pending.len() - hold;
                    let slice = &self.pending[..release];
                    out.reasoning.push_str(slice);
                    self.reasoning.push_str(slice);
                    self.pending.replace_range(..release, "");
                    return;
                }
                BlockState::AfterBlock => {
                    out.narrative.push_str(&self.pending);
                    self.pending.clear();
                    return;
                }
            }
        }
    }

    /// Earliest complete marker in `lower`; on a tie the longer marker wins.
    fn earliest_marker(&self, lower: &str) -> Option<(usize, Marker)> {
        let open = lower
            .find(self.delimiters.open())
            .map(|i| (i, Marker::Open, self.delimiters.open().len()));
        let close = lower
            .find(self.delimiters.close())
            .map(|i| (i, Marker::Close, self.delimiters.close().len()));
        match (open, close) {
            (Some(o), Some(c)) => {
                let pick = if o.0 < c.0 || (o.0 == c.0 && o.2 >= c.2) {
                    o
                } else {
                    c
                };
                Some((pick.0, pick.1))
            }
            (Some(o), None) => Some((o.0, o.1)),
            (None, Some(c)) => Some((c.0, c.1)),
            (None, None) => None,
        }
    }
}

/// Length of the longest suffix of `haystack` that is a proper prefix of any
/// needle. Only the last `needle.len() - 1` bytes are ever inspected.
fn partial_suffix_len(haystack: &str, needles: &[&str]) -> usize {
    let bytes = haystack.as_bytes();
    let mut best = 0;
    for needle in needles {
        let needle = needle.as_bytes();
        let max = needle.len().saturating_sub(1).min(bytes.len());
        for k in (best + 1..=max).rev() {
            if bytes.ends_with(&needle[..k]) {
                best = k;
                break;
            }
        }
    }
    best
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> (ClassifiedChunk, StreamClassifier) {
        let mut classifier = StreamClassifier::default();
        let mut total = ClassifiedChunk::default();
        for chunk in chunks {
            total.append(&classifier.process_chunk(chunk));
        }
        total.append(&classifier.finish());
        (total, classifier)
    }

    #[test]
    fn three_chunk_scenario() {
        let (out, classifier) = run(&["Intro <thi", "nk>reason", "ing</think> rest"]);
        assert_eq!(out.narrative, "Intro  rest");
        assert_eq!(out.reasoning, "reasoning");
        assert!(classifier.state().is_block_complete);
    }

    #[test]
    fn delimiter_split_at_every_position() {
        let text = "Intro <think>reasoning</think> rest";
        for split in 1..text.len() {
            let (out, _) = run(&[&text[..split], &text[split..]]);
            assert_eq!(out.narrative, "Intro  rest", "split at {split}");
            assert_eq!(out.reasoning, "reasoning", "split at {split}");
        }
    }

    #[test]
    fn plain_text_released_immediately() {
        let mut classifier = StreamClassifier::default();
        let out = classifier.process_chunk("Once upon a time");
        assert_eq!(out.narrative, "Once upon a time");
        assert!(out.reasoning.is_empty());
    }

    #[test]
    fn partial_prefix_is_held_then_released() {
        let mut classifier = StreamClassifier::default();
        let out = classifier.process_chunk("Hello <th");
        assert_eq!(out.narrative, "Hello ");

        // Not a delimiter after all
        let out = classifier.process_chunk("ere");
        assert_eq!(out.narrative, "<there");
        assert_eq!(classifier.block_state(), BlockState::BeforeBlock);
    }

    #[test]
    fn finish_flushes_held_narrative_tail() {
        let mut classifier = StreamClassifier::default();
        let _ = classifier.process_chunk("The end <");
        let out = classifier.finish();
        assert_eq!(out.narrative, "<");
    }

    #[test]
    fn reasoning_streams_incrementally() {
        let mut classifier = StreamClassifier::default();
        let first = classifier.process_chunk("<think>step one, ");
        assert_eq!(first.reasoning, "step one, ");
        assert!(first.narrative.is_empty());

        let second = classifier.process_chunk("step two</");
        assert_eq!(second.reasoning, "step two");

        let third = classifier.process_chunk("think>Story.");
        assert_eq!(third.reasoning, "");
        assert_eq!(third.narrative, "Story.");
        assert_eq!(
            classifier.state().accumulated_reasoning,
            "step one, step two"
        );
    }

    #[test]
    fn delimiters_match_case_insensitively() {
        let (out, _) = run(&["A<THINK>plan</Think>B"]);
        assert_eq!(out.narrative, "AB");
        assert_eq!(out.reasoning, "plan");
    }

    #[test]
    fn after_block_is_verbatim() {
        let (out, _) = run(&["<think>x</think>", "a <think> b", "</think> c"]);
        assert_eq!(out.reasoning, "x");
        assert_eq!(out.narrative, "a <think> b</think> c");
    }

    #[test]
    fn orphan_close_is_stripped() {
        let (out, classifier) = run(&["Story </thi", "nk>continues"]);
        assert_eq!(out.narrative, "Story continues");
        assert!(out.reasoning.is_empty());
        assert_eq!(classifier.block_state(), BlockState::BeforeBlock);
    }

    #[test]
    fn orphan_close_before_real_block() {
        let (out, _) = run(&["a</think>b<think>c</think>d"]);
        assert_eq!(out.narrative, "abd");
        assert_eq!(out.reasoning, "c");
    }

    #[test]
    fn unterminated_block_stays_inside() {
        let (out, classifier) = run(&["Lead <think>planning the sc", "ene</th"]);
        assert_eq!(out.narrative, "Lead ");
        assert_eq!(out.reasoning, "planning the scene</th");

        let state = classifier.state();
        assert!(state.is_inside_block);
        assert!(!state.is_block_complete);
        assert_eq!(state.accumulated_reasoning, "planning the scene</th");
    }

    #[test]
    fn state_includes_held_reasoning_tail() {
        let mut classifier = StreamClassifier::default();
        let _ = classifier.process_chunk("<think>abc</thi");
        assert_eq!(classifier.state().accumulated_reasoning, "abc</thi");
    }

    #[test]
    fn reset_allows_reuse() {
        let mut classifier = StreamClassifier::default();
        let _ = classifier.process_chunk("<think>old");
        classifier.reset();
        assert_eq!(classifier.block_state(), BlockState::BeforeBlock);
        assert!(classifier.state().accumulated_reasoning.is_empty());

        let out = classifier.process_chunk("fresh");
        assert_eq!(out.narrative, "fresh");
    }

    #[test]
    fn custom_delimiters() {
        let delims = ReasoningDelimiters::new("[[plan]]", "[[/plan]]").unwrap();
        let mut classifier = StreamClassifier::new(delims);
        let mut out = classifier.process_chunk("x[[pl");
        out.append(&classifier.process_chunk("an]]y[[/plan]]z"));
        out.append(&classifier.finish());
        assert_eq!(out.narrative, "xz");
        assert_eq!(out.reasoning, "y");
    }

    #[test]
    fn multibyte_text_around_delimiters() {
        let (out, _) = run(&["Café <", "think>naïve</think> – fin"]);
        assert_eq!(out.narrative, "Café  – fin");
        assert_eq!(out.reasoning, "naïve");
    }

    #[test]
    fn partial_suffix_len_examples() {
        assert_eq!(partial_suffix_len("abc <thi", &["<think>"]), 4);
        assert_eq!(partial_suffix_len("abc", &["<think>"]), 0);
        assert_eq!(partial_suffix_len("<think>", &["<think>"]), 0);
        assert_eq!(partial_suffix_len("a</", &["<think>", "</think>"]), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn fragment() -> impl Strategy<Value = String> {
            proptest::collection::vec(
                prop_oneof![
                    Just("<".to_string()),
                    Just("</".to_string()),
                    Just("<think>".to_string()),
                    Just("</think>".to_string()),
                    Just("<THINK>".to_string()),
                    Just("think>".to_string()),
                    Just("é".to_string()),
                    "[a-z ]{0,6}",
                ],
                0..12,
            )
            .prop_map(|parts| parts.concat())
        }

        fn classify(chunks: &[&str]) -> ClassifiedChunk {
            let mut classifier = StreamClassifier::default();
            let mut total = ClassifiedChunk::default();
            for chunk in chunks {
                total.append(&classifier.process_chunk(chunk));
            }
            total.append(&classifier.finish());
            total
        }

        proptest! {
            #[test]
            fn split_invariance(
                text in fragment(),
                cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
            ) {
                let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
                let mut points: Vec<usize> = cuts
                    .iter()
                    .filter(|_| !boundaries.is_empty())
                    .map(|ix| boundaries[ix.index(boundaries.len())])
                    .collect();
                points.sort_unstable();
                points.dedup();

                let mut chunks = Vec::new();
                let mut start = 0;
                for p in points {
                    chunks.push(&text[start..p]);
                    start = p;
                }
                chunks.push(&text[start..]);

                let whole = classify(&[text.as_str()]);
                let split = classify(&chunks);
                prop_assert_eq!(whole, split);
            }

            #[test]
            fn text_without_markers_is_all_narrative(text in "[a-z ,.]{0,64}") {
                let out = classify(&[text.as_str()]);
                prop_assert_eq!(out.narrative, text);
                prop_assert!(out.reasoning.is_empty());
            }
        }
    }
}
