//! # saga-stream
//!
//! Turns the raw text stream of one model response into a story segment.
//!
//! - [`classifier`]: incremental state machine splitting a reasoning block out
//!   of the narrative, tolerant of delimiters split across fragments
//! - [`recovery`]: best-effort narrative recovery from an unterminated block
//! - [`response`]: STORY / SCENE / CHOICES section parser with fallbacks

#![deny(unsafe_code)]

pub mod classifier;
pub mod delimiters;
pub mod errors;
pub mod recovery;
pub mod response;

pub use classifier::{BlockState, ClassifiedChunk, ClassifierState, StreamClassifier};
pub use delimiters::ReasoningDelimiters;
pub use errors::ParseError;
pub use recovery::recover_narrative;
pub use response::{ParsedResponse, parse_response};
