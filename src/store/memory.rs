//! In-memory store
//!
//! Backs tests and dry runs. Supports injected write failures so the chunk
//! policy can be exercised without a database.

use super::{Store, StoreError};
use crate::alert::{AlertConfig, AlertEvent, PriceObservation};
use crate::outcome::Settlement;
use crate::universe::{Symbol, SymbolUniverse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    symbols: Vec<Symbol>,
    observations: Vec<PriceObservation>,
    configs: BTreeMap<String, AlertConfig>,
    alerts: Vec<AlertEvent>,
    settlements: Vec<Settlement>,
    failing_writes: usize,
    reconnects: usize,
    closed: bool,
}

impl Inner {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Consume one injected failure, if any
    fn take_failure(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::Database("injected write failure".to_string()));
        }
        Ok(())
    }

    fn symbol_mut(&mut self, symbol: &str) -> Result<&mut Symbol, StoreError> {
        self.symbols
            .iter_mut()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| StoreError::Database(format!("unknown symbol {symbol}")))
    }
}

/// Store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a symbol as-is, quarantine and streak included
    pub async fn insert_symbol(&self, symbol: Symbol) {
        self.inner.lock().await.symbols.push(symbol);
    }

    pub async fn symbols(&self) -> Vec<Symbol> {
        self.inner.lock().await.symbols.clone()
    }

    pub async fn observations(&self) -> Vec<PriceObservation> {
        self.inner.lock().await.observations.clone()
    }

    pub async fn alerts(&self) -> Vec<AlertEvent> {
        self.inner.lock().await.alerts.clone()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.inner.lock().await.settlements.clone()
    }

    /// Make the next `n` observation or alert appends fail
    pub async fn fail_next_writes(&self, n: usize) {
        self.inner.lock().await.failing_writes = n;
    }

    pub async fn reconnect_count(&self) -> usize {
        self.inner.lock().await.reconnects
    }
}

#[async_trait]
impl SymbolUniverse for MemoryStore {
    async fn fetch_symbols(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<Symbol>> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(inner.symbols.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn set_quarantine(
        &self,
        symbol: &str,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        inner.symbol_mut(symbol)?.quarantine_until = until;
        Ok(())
    }

    async fn set_failure_streak(&self, symbol: &str, streak: u32) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        inner.symbol_mut(symbol)?.failure_streak = streak;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn reconnect(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.reconnects += 1;
        inner.closed = false;
        Ok(())
    }

    async fn close(&self) {
        self.inner.lock().await.closed = true;
    }

    async fn upsert_symbol(&self, symbol: &Symbol) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        match inner.symbols.iter_mut().find(|s| s.symbol == symbol.symbol) {
            Some(existing) => {
                existing.name = symbol.name.clone();
                existing.exchange = symbol.exchange.clone();
            }
            None => inner.symbols.push(symbol.clone()),
        }
        Ok(())
    }

    async fn append_observations(&self, rows: &[PriceObservation]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        inner.observations.extend_from_slice(rows);
        Ok(())
    }

    async fn baselines_at(
        &self,
        symbols: &[String],
        at: DateTime<Utc>,
    ) -> Result<HashMap<String, PriceObservation>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        let wanted: HashSet<&String> = symbols.iter().collect();
        let mut out: HashMap<String, PriceObservation> = HashMap::new();
        for obs in inner
            .observations
            .iter()
            .filter(|o| o.timestamp <= at && wanted.contains(&o.symbol))
        {
            match out.get(&obs.symbol) {
                Some(current) if current.timestamp >= obs.timestamp => {}
                _ => {
                    out.insert(obs.symbol.clone(), obs.clone());
                }
            }
        }
        Ok(out)
    }

    async fn prune_observations(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        let len = inner.observations.len();
        inner.observations.retain(|o| o.timestamp >= before);
        Ok((len - inner.observations.len()) as u64)
    }

    async fn alert_configs(&self) -> Result<Vec<AlertConfig>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(inner.configs.values().cloned().collect())
    }

    async fn upsert_alert_config(
        &self,
        symbol: &str,
        threshold_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        inner
            .configs
            .entry(symbol.to_string())
            .and_modify(|c| {
                c.threshold_pct = threshold_pct;
                c.enabled = true;
            })
            .or_insert_with(|| AlertConfig {
                symbol: symbol.to_string(),
                threshold_pct,
                enabled: true,
                created_at: now,
            });
        Ok(())
    }

    async fn disable_alert_config(&self, symbol: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(match inner.configs.get_mut(symbol) {
            Some(config) => {
                config.enabled = false;
                true
            }
            None => false,
        })
    }

    async fn symbols_alerted_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(inner
            .alerts
            .iter()
            .filter(|a| a.sent_at > since)
            .map(|a| a.symbol.clone())
            .collect())
    }

    async fn append_alert(&self, alert: &AlertEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        inner.alerts.push(alert.clone());
        Ok(())
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertEvent>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        let mut alerts: Vec<AlertEvent> = inner
            .alerts
            .iter()
            .filter(|a| a.sent_at >= since)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.sent_at);
        Ok(alerts)
    }

    async fn settlement_exists(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(inner.settlements.iter().any(|s| s.alert_id == alert_id))
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_open()?;
        if inner.settlements.iter().any(|s| s.alert_id == settlement.alert_id) {
            return Ok(false);
        }
        inner.settlements.push(settlement.clone());
        Ok(true)
    }

    async fn settlements_since(&self, since: DateTime<Utc>) -> Result<Vec<Settlement>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_open()?;
        Ok(inner
            .settlements
            .iter()
            .filter(|s| s.alert_time >= since)
            .cloned()
            .collect())
    }
}
