//! Runtime error types.

use saga_store::StoreError;
use saga_stream::ParseError;

/// Failure reported by the upstream text-generation stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Transport-level failure (connection dropped, 5xx).
    #[error("generation transport error: {0}")]
    Transport(String),

    /// Service asked us to slow down.
    #[error("generation rate limited")]
    RateLimited,

    /// Request refused (bad prompt, content policy).
    #[error("generation rejected: {0}")]
    Rejected(String),
}

impl GenerationError {
    /// Whether requesting the same generation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited)
    }
}

/// Errors surfaced by the turn pipeline.
///
/// Persistence failures are not here: they are reported through
/// [`crate::WriteOutcome`] and [`crate::PersistenceEvent`] and never halt play.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Upstream generation failed mid-stream.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Narrative could not be parsed into a segment.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Storage failed outside the retried write path.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Stream consumption was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Settings could not be turned into an engine configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the player can simply try again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::Cancelled => true,
            Self::Parse(_) | Self::Config(_) | Self::Internal(_) => false,
        }
    }

    /// Error category string for logs and UI.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Parse(_) => "parse",
            Self::Store(_) => "store",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}
