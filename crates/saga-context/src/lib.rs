//! # saga-context
//!
//! Builds the prompt context for the next turn from unbounded session
//! history, fitting it into a caller-supplied token budget.
//!
//! - **Token estimation**: `ceil(bytes / 4)`, no tokenizer dependency
//! - **Budgeter**: reserves room for the immediate context (scene, previous
//!   segment, player action), then packs older history newest-first

#![deny(unsafe_code)]

pub mod budgeter;
pub mod constants;
pub mod token_estimator;

pub use budgeter::{BudgetConfig, BudgetInput, TokenBudgetResult, build_context};
pub use token_estimator::estimate_tokens;
