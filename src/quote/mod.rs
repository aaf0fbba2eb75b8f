//! Quote source module
//!
//! Best-effort current quotes and historical intrabar paths. Providers may
//! omit symbols; absence means "unavailable this run".

mod types;
mod yahoo;

pub use types::{FetchError, IntrabarSample, Quote, QuoteBatch};
pub use yahoo::YahooClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Trait for market data providers
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Current price and volume for each symbol
    async fn get_current(&self, symbols: &[String]) -> QuoteBatch;

    /// Last known price at or before `at`
    async fn get_historical_at(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, FetchError>;

    /// Ordered fixed-interval bars covering `[start, end)`
    async fn get_intrabar_path(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
    ) -> Result<Vec<IntrabarSample>, FetchError>;
}
