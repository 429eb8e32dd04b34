//! Retry configuration and backoff math.
//!
//! Sync-only building blocks; the async retry loop lives in `saga-runtime`
//! next to the storage calls it wraps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Retry parameters for storage writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Cap on a single delay in ms.
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0, applied symmetrically.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (zero-based) given a random
    /// sample in `[0.0, 1.0)`.
    pub fn delay_for(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

/// Exponential backoff without jitter: `min(max_delay, base * 2^attempt)`.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

/// Exponential backoff with jitter.
///
/// `random` in `[0.0, 1.0)` maps to a multiplier in
/// `[1 - jitter, 1 + jitter)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let capped = calculate_backoff_delay(attempt, base_delay_ms, max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
