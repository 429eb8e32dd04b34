//! Stream collector: drives one response through a fresh classifier.

use futures::{Stream, StreamExt};
use saga_stream::{BlockState, ClassifiedChunk, ReasoningDelimiters, StreamClassifier, recover_narrative};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{GenerationError, RuntimeError};

/// Incremental output forwarded while a response streams in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamUpdate {
    /// Narrative text for the story view.
    Narrative(String),
    /// Reasoning text for the thinking view.
    Reasoning(String),
}

/// A fully consumed response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedResponse {
    /// All narrative text, ready for the response parser.
    pub narrative: String,
    /// All reasoning text.
    pub reasoning: String,
    /// Classifier position at end of stream.
    pub block_state: BlockState,
    /// The narrative was recovered from an unterminated reasoning block.
    pub recovered: bool,
}

impl CollectedResponse {
    /// A response that arrived without any reasoning block.
    pub fn narrative_only(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            reasoning: String::new(),
            block_state: BlockState::BeforeBlock,
            recovered: false,
        }
    }

    /// The reasoning trace, if any was produced.
    pub fn reasoning_trace(&self) -> Option<String> {
        let trimmed = self.reasoning.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

/// Consume a fragment stream, splitting narrative from reasoning.
///
/// Each delta is forwarded to `updates` as soon as the classifier releases
/// it. Cancellation wins over a ready fragment. When the stream ends inside
/// an unterminated reasoning block and no narrative was produced, the
/// narrative is recovered from the reasoning on a best-effort basis.
pub async fn collect_response<S>(
    stream: S,
    delimiters: &ReasoningDelimiters,
    cancel: &CancellationToken,
    updates: Option<&mpsc::UnboundedSender<StreamUpdate>>,
) -> Result<CollectedResponse, RuntimeError>
where
    S: Stream<Item = Result<String, GenerationError>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut classifier = StreamClassifier::new(delimiters.clone());
    let mut collected = ClassifiedChunk::default();
    let mut fragments = 0usize;

    loop {
        let fragment = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(fragments, "response stream cancelled");
                return Err(RuntimeError::Cancelled);
            }
            fragment = stream.next() => fragment,
        };

        let Some(fragment) = fragment else {
            break;
        };
        let chunk = classifier.process_chunk(&fragment?);
        fragments += 1;
        forward(updates, &chunk);
        collected.append(&chunk);
    }

    let tail = classifier.finish();
    forward(updates, &tail);
    collected.append(&tail);

    let block_state = classifier.block_state();
    let mut recovered = false;
    if block_state == BlockState::InsideBlock && collected.narrative.trim().is_empty() {
        if let Some(narrative) = recover_narrative(&collected.reasoning) {
            warn!(
                recovered_len = narrative.len(),
                "reasoning block never closed, narrative recovered from it"
            );
            collected.narrative = narrative;
            recovered = true;
        } else {
            warn!("reasoning block never closed, no narrative recovered");
        }
    }

    debug!(
        fragments,
        narrative_len = collected.narrative.len(),
        reasoning_len = collected.reasoning.len(),
        "response collected"
    );
    Ok(CollectedResponse {
        narrative: collected.narrative,
        reasoning: collected.reasoning,
        block_state,
        recovered,
    })
}

fn forward(updates: Option<&mpsc::UnboundedSender<StreamUpdate>>, chunk: &ClassifiedChunk) {
    let Some(tx) = updates else {
        return;
    };
    if !chunk.reasoning.is_empty() {
        let _ = tx.send(StreamUpdate::Reasoning(chunk.reasoning.clone()));
    }
    if !chunk.narrative.is_empty() {
        let _ = tx.send(StreamUpdate::Narrative(chunk.narrative.clone()));
    }
}
