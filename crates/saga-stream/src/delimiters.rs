//! Reasoning block markers.

use thiserror::Error;

/// Default marker opening the reasoning block.
pub const DEFAULT_OPEN: &str = "<think>";
/// Default marker closing the reasoning block.
pub const DEFAULT_CLOSE: &str = "</think>";

/// Rejected delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelimiterError {
    /// A delimiter is empty.
    #[error("reasoning delimiters must not be empty")]
    Empty,
    /// A delimiter contains non-ASCII characters.
    #[error("reasoning delimiter {0:?} is not ASCII")]
    NonAscii(String),
    /// Open and close compare equal ignoring case.
    #[error("open and close delimiters are identical: {0:?}")]
    Identical(String),
}

/// Literal open/close markers, matched ASCII case-insensitively.
///
/// ASCII-only markers keep byte offsets identical between the buffer and its
/// lowercased copy, so match positions are always char boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReasoningDelimiters {
    open: String,
    close: String,
}

impl ReasoningDelimiters {
    /// Build a delimiter pair.
    pub fn new(open: &str, close: &str) -> Result<Self, DelimiterError> {
        if open.is_empty() || close.is_empty() {
            return Err(DelimiterError::Empty);
        }
        for d in [open, close] {
            if !d.is_ascii() {
                return Err(DelimiterError::NonAscii(d.to_owned()));
            }
        }
        if open.eq_ignore_ascii_case(close) {
            return Err(DelimiterError::Identical(open.to_owned()));
        }
        Ok(Self {
            open: open.to_ascii_lowercase(),
            close: close.to_ascii_lowercase(),
        })
    }

    /// Lowercased open marker.
    pub fn open(&self) -> &str {
        &self.open
    }

    /// Lowercased close marker.
    pub fn close(&self) -> &str {
        &self.close
    }

    /// Length of the longer marker, the most a partial match can hold back.
    pub fn max_len(&self) -> usize {
        self.open.len().max(self.close.len())
    }
}

impl Default for ReasoningDelimiters {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN.to_owned(),
            close: DEFAULT_CLOSE.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pair() {
        let d = ReasoningDelimiters::default();
        assert_eq!(d.open(), "<think>");
        assert_eq!(d.close(), "</think>");
        assert_eq!(d.max_len(), 8);
    }

    #[test]
    fn new_lowercases() {
        let d = ReasoningDelimiters::new("<REASONING>", "</Reasoning>").unwrap();
        assert_eq!(d.open(), "<reasoning>");
        assert_eq!(d.close(), "</reasoning>");
    }

    #[test]
    fn rejects_bad_pairs() {
        assert_eq!(ReasoningDelimiters::new("", "x"), Err(DelimiterError::Empty));
        assert!(matches!(
            ReasoningDelimiters::new("«", "»"),
            Err(DelimiterError::NonAscii(_))
        ));
        assert!(matches!(
            ReasoningDelimiters::new("<t>", "<T>"),
            Err(DelimiterError::Identical(_))
        ));
    }
}
