//! Persistent store module
//!
//! The store is the only shared mutable resource. Observations, alerts and
//! settlements are append-only; symbols and alert configs are upserted.

mod memory;
mod sqlite;
mod writer;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use writer::{with_retry, write_chunks, WriteReport};

use crate::alert::{AlertConfig, AlertEvent, PriceObservation};
use crate::outcome::Settlement;
use crate::universe::{Symbol, SymbolUniverse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed the operation
    #[error("database error: {0}")]
    Database(String),
    /// A stored row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The handle was closed
    #[error("store is closed")]
    Closed,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => StoreError::Closed,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(e.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Trait for persistent store implementations
#[async_trait]
pub trait Store: SymbolUniverse {
    /// Drop the current connection and open a fresh one
    async fn reconnect(&self) -> Result<(), StoreError>;

    /// Release the connection. Further calls fail with `Closed`.
    async fn close(&self);

    /// Insert a symbol or update its name and exchange
    async fn upsert_symbol(&self, symbol: &Symbol) -> Result<(), StoreError>;

    async fn append_observations(&self, rows: &[PriceObservation]) -> Result<(), StoreError>;

    /// Latest observation at or before `at` for each requested symbol
    async fn baselines_at(
        &self,
        symbols: &[String],
        at: DateTime<Utc>,
    ) -> Result<HashMap<String, PriceObservation>, StoreError>;

    /// Delete observations older than `before`; returns the number removed
    async fn prune_observations(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    /// All alert configs, enabled or not, ordered by symbol
    async fn alert_configs(&self) -> Result<Vec<AlertConfig>, StoreError>;

    /// Create or update a config; re-enables a disabled one
    async fn upsert_alert_config(
        &self,
        symbol: &str,
        threshold_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Soft-delete a config; `false` when none exists
    async fn disable_alert_config(&self, symbol: &str) -> Result<bool, StoreError>;

    /// Symbols with an alert sent after `since`
    async fn symbols_alerted_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError>;

    async fn append_alert(&self, alert: &AlertEvent) -> Result<(), StoreError>;

    /// Alerts sent at or after `since`, oldest first
    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertEvent>, StoreError>;

    async fn settlement_exists(&self, alert_id: Uuid) -> Result<bool, StoreError>;

    /// Insert a settlement; `false` when one already exists for the alert
    async fn insert_settlement(&self, settlement: &Settlement) -> Result<bool, StoreError>;

    /// Settlements of alerts sent at or after `since`
    async fn settlements_since(&self, since: DateTime<Utc>) -> Result<Vec<Settlement>, StoreError>;
}
