//! What a single stage invocation knows about its run.
//!
//! This module provides:
//! - The work key identifying a run across invocations
//! - One input variant per stage, validated at the process boundary

mod identity;
mod inputs;

pub use identity::{validate_symbol, WorkKey, MAX_SYMBOL_LEN};
pub use inputs::{validate_webhook_url, MarketSnapshot, StageInput};
