//! Turn pipeline: response stream → segment → session → store.

mod engine;
mod stream;

pub use engine::SessionEngine;
pub use stream::{CollectedResponse, StreamUpdate, collect_response};
