//! Quote source types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A current quote for one symbol, resolved at the quote source boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    /// Last traded price, always positive
    pub price: Decimal,
    /// Session volume when the provider reports it
    pub volume: Option<u64>,
    /// Trailing average daily volume when the provider reports it
    pub avg_volume: Option<u64>,
    /// When the quote was taken
    pub timestamp: DateTime<Utc>,
}

/// One fixed-interval bar of an intrabar price path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrabarSample {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl IntrabarSample {
    pub fn new(timestamp: DateTime<Utc>, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            timestamp,
            high,
            low,
            close,
        }
    }
}

/// Why a symbol produced no usable observation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Request did not complete within the timeout
    #[error("request timed out")]
    Timeout,
    /// Provider answered with a non-success status
    #[error("http status {0}")]
    Http(u16),
    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Provider had nothing for this symbol
    #[error("no data")]
    NoData,
    /// Response could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Http(status.as_u16())
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Per-symbol results of one `get_current` call.
///
/// Every requested symbol has an entry: a symbol the provider silently
/// omitted is recorded as `FetchError::NoData`.
#[derive(Debug, Clone, Default)]
pub struct QuoteBatch {
    results: Vec<(String, Result<Quote, FetchError>)>,
}

impl QuoteBatch {
    /// Build a batch from whatever the provider returned for `requested`
    pub fn from_results(
        requested: &[String],
        mut returned: HashMap<String, Result<Quote, FetchError>>,
    ) -> Self {
        let results = requested
            .iter()
            .map(|symbol| {
                let result = returned
                    .remove(symbol)
                    .unwrap_or(Err(FetchError::NoData))
                    .and_then(|q| {
                        if q.price > Decimal::ZERO {
                            Ok(q)
                        } else {
                            Err(FetchError::Malformed(format!("non-positive price {}", q.price)))
                        }
                    });
                (symbol.clone(), result)
            })
            .collect();
        Self { results }
    }

    /// Merge another batch into this one
    pub fn extend(&mut self, other: QuoteBatch) {
        self.results.extend(other.results);
    }

    /// Usable quotes
    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    /// Symbols that failed, with the reason
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FetchError)> {
        self.results
            .iter()
            .filter_map(|(s, r)| r.as_ref().err().map(|e| (s.as_str(), e)))
    }

    /// Symbols with a usable quote
    pub fn fetched_symbols(&self) -> HashSet<String> {
        self.quotes().map(|q| q.symbol.clone()).collect()
    }

    /// Quotes keyed by symbol
    pub fn by_symbol(&self) -> HashMap<String, Quote> {
        self.quotes().map(|q| (q.symbol.clone(), q.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
