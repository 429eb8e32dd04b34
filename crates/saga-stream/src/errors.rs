//! Response parsing errors.

use thiserror::Error;

/// The narrative text could not be turned into a segment.
///
/// Parse errors are not retryable: the same text always fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The response contained no narrative at all.
    #[error("response is empty")]
    EmptyResponse,

    /// Sections were found but no story text could be extracted.
    #[error("no story text found (sections present: {sections})")]
    EmptyStory {
        /// Comma-separated labels that were present.
        sections: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_sections() {
        let err = ParseError::EmptyStory {
            sections: "SCENE, CHOICES".into(),
        };
        assert_eq!(
            err.to_string(),
            "no story text found (sections present: SCENE, CHOICES)"
        );
    }
}
