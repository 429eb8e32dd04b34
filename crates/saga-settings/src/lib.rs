//! # saga-settings
//!
//! Configuration for the Saga session engine, loaded in three layers
//! (lowest to highest priority):
//!
//! 1. **Compiled defaults**: [`SagaSettings::default()`]
//! 2. **User file**: `~/.saga/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `SAGA_*` overrides
//!
//! Settings are loaded explicitly by the binary and passed down; there is no
//! process-wide singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
