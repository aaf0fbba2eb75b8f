//! Quarantine ledger
//!
//! Symbols that keep failing to produce a usable quote are parked for a
//! fixed number of days. Quarantine is only ever read as a filter and
//! expires on its own.

use super::{Symbol, SymbolUniverse};
use crate::config::QuarantineConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// What happened to one symbol after a fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    /// Quote was usable; streak is (or stays) zero
    Healthy,
    /// Failure recorded, below the threshold
    Strike(u32),
    /// Threshold reached; excluded until the given instant
    Quarantine(DateTime<Utc>),
}

/// Result of applying one run's fetch results to the ledger
#[derive(Debug, Clone, Default)]
pub struct QuarantineOutcome {
    /// Symbols newly quarantined
    pub quarantined: Vec<String>,
    /// Symbols with a recorded failure below the threshold
    pub strikes: usize,
    /// Symbols whose failure streak was cleared
    pub recovered: usize,
    /// Ledger writes that failed (left for the next run)
    pub write_failures: usize,
}

/// Per-symbol cool-down bookkeeping
#[derive(Debug, Clone)]
pub struct QuarantineLedger {
    duration: Duration,
    failure_threshold: u32,
}

impl QuarantineLedger {
    pub fn new(config: &QuarantineConfig) -> Self {
        Self {
            duration: Duration::days(config.days),
            failure_threshold: config.failure_threshold.max(1),
        }
    }

    /// Decide the ledger action for a symbol given this run's fetch result
    pub fn evaluate(&self, symbol: &Symbol, fetched: bool, now: DateTime<Utc>) -> LedgerAction {
        if fetched {
            return LedgerAction::Healthy;
        }
        let streak = symbol.failure_streak.saturating_add(1);
        if streak >= self.failure_threshold {
            LedgerAction::Quarantine(now + self.duration)
        } else {
            LedgerAction::Strike(streak)
        }
    }

    /// Record the outcome of every attempted symbol.
    ///
    /// Only symbols that were actually attempted should be passed in; symbols
    /// skipped by the run budget have no verdict. Individual write failures
    /// are logged and counted, never propagated.
    pub async fn apply(
        &self,
        universe: &dyn SymbolUniverse,
        attempted: &[Symbol],
        fetched: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> QuarantineOutcome {
        let mut outcome = QuarantineOutcome::default();

        for symbol in attempted {
            let action = self.evaluate(symbol, fetched.contains(&symbol.symbol), now);
            let result = match action {
                LedgerAction::Healthy if symbol.failure_streak == 0 => continue,
                LedgerAction::Healthy => {
                    outcome.recovered += 1;
                    universe.set_failure_streak(&symbol.symbol, 0).await
                }
                LedgerAction::Strike(streak) => {
                    outcome.strikes += 1;
                    universe.set_failure_streak(&symbol.symbol, streak).await
                }
                LedgerAction::Quarantine(until) => {
                    tracing::info!(symbol = %symbol.symbol, %until, "Quarantining symbol");
                    outcome.quarantined.push(symbol.symbol.clone());
                    match universe.set_quarantine(&symbol.symbol, Some(until)).await {
                        Ok(()) => universe.set_failure_streak(&symbol.symbol, 0).await,
                        Err(e) => Err(e),
                    }
                }
            };

            if let Err(e) = result {
                outcome.write_failures += 1;
                tracing::warn!(symbol = %symbol.symbol, error = %e, "Quarantine ledger write failed");
            }
        }

        outcome
    }
}
