//! Settings type definitions.
//!
//! All types use camelCase JSON names and `#[serde(default)]`, so a partial
//! settings file only needs the keys it overrides.

use saga_core::logging::LogFormat;
use saga_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest accepted `context.minPartialTokens`: the token overhead of one
/// packed history entry.
pub const MIN_PARTIAL_TOKENS_FLOOR: u32 = 2;

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SagaSettings {
    /// Snapshot persistence (debounce, conflicts, retries).
    pub persistence: PersistenceSettings,
    /// Context budgeting.
    pub context: ContextSettings,
    /// Reasoning block delimiters.
    pub reasoning: ReasoningSettings,
    /// Storage location.
    pub storage: StorageSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl SagaSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let ratio = self.context.history_floor_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(SettingsError::InvalidValue(format!(
                "context.historyFloorRatio must be within 0..=1, got {ratio}"
            )));
        }
        let min_partial = self.context.min_partial_tokens;
        if min_partial < MIN_PARTIAL_TOKENS_FLOOR {
            return Err(SettingsError::InvalidValue(format!(
                "context.minPartialTokens must be at least {MIN_PARTIAL_TOKENS_FLOOR}, got {min_partial}"
            )));
        }
        let jitter = self.persistence.retry.jitter_factor;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(SettingsError::InvalidValue(format!(
                "persistence.retry.jitterFactor must be within 0..=1, got {jitter}"
            )));
        }
        let open = &self.reasoning.open_delimiter;
        let close = &self.reasoning.close_delimiter;
        if open.is_empty() || close.is_empty() {
            return Err(SettingsError::InvalidValue(
                "reasoning delimiters must not be empty".into(),
            ));
        }
        if !open.is_ascii() || !close.is_ascii() {
            return Err(SettingsError::InvalidValue(
                "reasoning delimiters must be ASCII".into(),
            ));
        }
        if open.eq_ignore_ascii_case(close) {
            return Err(SettingsError::InvalidValue(
                "reasoning open and close delimiters must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Persistence coordinator settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Delay between the last scheduled mutation and the write.
    pub debounce_ms: u64,
    /// How much newer a stored snapshot may be before it counts as a conflict.
    pub conflict_tolerance_ms: u64,
    /// Capacity of the persistence event broadcast channel.
    pub event_channel_capacity: usize,
    /// Backoff for transient storage failures.
    pub retry: RetryConfig,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            conflict_tolerance_ms: 2_000,
            event_channel_capacity: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Context budgeter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Budget used when the caller does not supply one (CLI only).
    pub default_budget_tokens: u32,
    /// Tokens held back from the recent-segment allotment.
    pub safety_buffer_tokens: u32,
    /// Lower bound of the history floor.
    pub min_history_floor_tokens: u32,
    /// History floor as a share of the remaining budget.
    pub history_floor_ratio: f64,
    /// Smallest remainder worth filling with a truncated older segment.
    pub min_partial_tokens: u32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_budget_tokens: 8_000,
            safety_buffer_tokens: 200,
            min_history_floor_tokens: 1_000,
            history_floor_ratio: 0.3,
            min_partial_tokens: 100,
        }
    }
}

/// Reasoning block delimiters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReasoningSettings {
    /// Marker opening the reasoning block.
    pub open_delimiter: String,
    /// Marker closing the reasoning block.
    pub close_delimiter: String,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            open_delimiter: "<think>".into(),
            close_delimiter: "</think>".into(),
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// `SQLite` database path. Empty means `~/.saga/sessions.db`.
    pub db_path: String,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SagaSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.persistence.debounce_ms, 1_000);
        assert_eq!(settings.context.min_history_floor_tokens, 1_000);
        assert_eq!(settings.reasoning.open_delimiter, "<think>");
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: SagaSettings =
            serde_json::from_str(r#"{"persistence": {"debounceMs": 250}}"#).unwrap();
        assert_eq!(settings.persistence.debounce_ms, 250);
        assert_eq!(settings.persistence.conflict_tolerance_ms, 2_000);
        assert_eq!(settings.context, ContextSettings::default());
    }

    #[test]
    fn out_of_range_ratio_rejected() {
        let mut settings = SagaSettings::default();
        settings.context.history_floor_ratio = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn min_partial_below_entry_overhead_rejected() {
        let mut settings = SagaSettings::default();
        settings.context.min_partial_tokens = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("minPartialTokens")
        ));
        settings.context.min_partial_tokens = MIN_PARTIAL_TOKENS_FLOOR;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn identical_delimiters_rejected() {
        let mut settings = SagaSettings::default();
        settings.reasoning.close_delimiter = "<THINK>".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        let mut settings = SagaSettings::default();
        settings.reasoning.open_delimiter = "«think»".into();
        assert!(settings.validate().is_err());
    }
}
