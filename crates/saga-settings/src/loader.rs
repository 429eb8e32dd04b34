//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::SagaSettings;

/// Directory holding Saga's user files (`~/.saga`).
pub fn saga_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".saga")
}

/// Path to the user settings file (`~/.saga/settings.json`).
pub fn settings_path() -> PathBuf {
    saga_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SagaSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<SagaSettings> {
    let defaults = serde_json::to_value(SagaSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SagaSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    if settings.storage.db_path.is_empty() {
        settings.storage.db_path = saga_home().join("sessions.db").display().to_string();
    }
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SAGA_*` environment overrides.
///
/// Invalid values are logged and ignored.
#[allow(clippy::cast_possible_truncation)] // ranges below fit in u32
pub fn apply_env_overrides(settings: &mut SagaSettings) {
    if let Some(v) = read_env_u64("SAGA_DEBOUNCE_MS", 0, 600_000) {
        settings.persistence.debounce_ms = v;
    }
    if let Some(v) = read_env_u64("SAGA_CONFLICT_TOLERANCE_MS", 0, 3_600_000) {
        settings.persistence.conflict_tolerance_ms = v;
    }
    if let Some(v) = read_env_u64("SAGA_MAX_RETRIES", 0, 20) {
        settings.persistence.retry.max_retries = v as u32;
    }
    if let Some(v) = read_env_u64("SAGA_RETRY_BASE_DELAY_MS", 1, 60_000) {
        settings.persistence.retry.base_delay_ms = v;
    }
    if let Some(v) = read_env_u64("SAGA_BUDGET_TOKENS", 1, 10_000_000) {
        settings.context.default_budget_tokens = v as u32;
    }
    if let Some(v) = read_env_string("SAGA_REASONING_OPEN") {
        settings.reasoning.open_delimiter = v;
    }
    if let Some(v) = read_env_string("SAGA_REASONING_CLOSE") {
        settings.reasoning.close_delimiter = v;
    }
    if let Some(v) = read_env_string("SAGA_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = read_env_string("SAGA_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("SAGA_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => tracing::warn!(key = "SAGA_LOG_FORMAT", error = %e, "ignoring env var"),
        }
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
