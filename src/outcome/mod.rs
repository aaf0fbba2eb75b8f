//! Trade outcome module
//!
//! Simulates how each alert would have traded, settles it once, and
//! aggregates settlements into report statistics.

mod analytics;
mod settle;
mod simulator;
mod types;

pub use analytics::{aggregate, Category, CategoryStats, RankedOutcome, Stats, Summary, Verdict};
pub use settle::{SettlementPass, SettlementReport};
pub use simulator::{horizon_returns, ExitPolicy};
pub use types::{ExitReason, Horizon, HorizonReturns, Settlement, TradeOutcome};
