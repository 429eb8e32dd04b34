//! Engine configuration derived from [`SagaSettings`].

use std::time::Duration;

use saga_context::BudgetConfig;
use saga_settings::{ContextSettings, PersistenceSettings, SagaSettings};
use saga_stream::ReasoningDelimiters;

use crate::errors::RuntimeError;
use crate::persistence::PersistenceConfig;

/// Everything the [`crate::SessionEngine`] needs besides a store.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Context budgeter tunables.
    pub budget: BudgetConfig,
    /// Reasoning block markers.
    pub delimiters: ReasoningDelimiters,
    /// Coordinator timing and retry policy.
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &SagaSettings) -> Result<Self, RuntimeError> {
        let delimiters = ReasoningDelimiters::new(
            &settings.reasoning.open_delimiter,
            &settings.reasoning.close_delimiter,
        )
        .map_err(|e| RuntimeError::Config(e.to_string()))?;
        Ok(Self {
            budget: budget_config(&settings.context),
            delimiters,
            persistence: persistence_config(&settings.persistence),
        })
    }
}

/// Budgeter tunables from the `context` section.
pub fn budget_config(context: &ContextSettings) -> BudgetConfig {
    BudgetConfig {
        safety_buffer_tokens: tokens(context.safety_buffer_tokens),
        min_history_floor_tokens: tokens(context.min_history_floor_tokens),
        history_floor_ratio: context.history_floor_ratio,
        min_partial_tokens: tokens(context.min_partial_tokens),
    }
}

fn tokens(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Coordinator settings from the `persistence` section.
pub fn persistence_config(persistence: &PersistenceSettings) -> PersistenceConfig {
    PersistenceConfig {
        debounce: Duration::from_millis(persistence.debounce_ms),
        conflict_tolerance: Duration::from_millis(persistence.conflict_tolerance_ms),
        retry: persistence.retry.clone(),
        event_capacity: persistence.event_channel_capacity.max(1),
    }
}
