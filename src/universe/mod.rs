//! Symbol universe module
//!
//! The universe of ticker symbols, the rotation scheduler that picks a
//! bounded slice of it each run, and the quarantine ledger that keeps
//! persistently failing symbols out of rotation.

mod quarantine;
mod rotation;

pub use quarantine::{LedgerAction, QuarantineLedger, QuarantineOutcome};
pub use rotation::{load_universe, select_slice, time_slot, Slice};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ticker symbol in the universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Ticker (e.g. "AAPL")
    pub symbol: String,
    /// Display name
    pub name: Option<String>,
    /// Listing exchange
    pub exchange: String,
    /// Excluded from rotation until this instant; `None` means active
    pub quarantine_until: Option<DateTime<Utc>>,
    /// Consecutive runs without a usable quote
    pub failure_streak: u32,
}

impl Symbol {
    /// Create an active symbol
    pub fn new(symbol: impl Into<String>, name: Option<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            name,
            exchange: exchange.into(),
            quarantine_until: None,
            failure_streak: 0,
        }
    }

    /// Whether the symbol may be scheduled at `now`.
    ///
    /// Quarantine self-expires: once `quarantine_until < now` the symbol is
    /// eligible again without any reset.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.quarantine_until {
            None => true,
            Some(until) => until < now,
        }
    }
}

/// Ordered, paginated access to the symbol universe
#[async_trait]
pub trait SymbolUniverse: Send + Sync {
    /// Read one page ordered by insertion order
    async fn fetch_symbols(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<Symbol>>;
    /// Set or clear the quarantine deadline of a symbol
    async fn set_quarantine(
        &self,
        symbol: &str,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
    /// Persist the consecutive failure count of a symbol
    async fn set_failure_streak(&self, symbol: &str, streak: u32) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_symbol_is_active_and_uppercased() {
        let s = Symbol::new("aapl", Some("Apple Inc.".into()), "NASDAQ");
        assert_eq!(s.symbol, "AAPL");
        assert!(s.is_active(Utc::now()));
    }

    #[test]
    fn test_quarantined_symbol_expires() {
        let now = Utc::now();
        let mut s = Symbol::new("XYZ", None, "NYSE");
        s.quarantine_until = Some(now + Duration::days(1));
        assert!(!s.is_active(now));
        assert!(!s.is_active(now + Duration::days(1)));
        assert!(s.is_active(now + Duration::days(1) + Duration::seconds(1)));
    }
}
