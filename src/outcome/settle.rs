//! Settlement pass
//!
//! Finds alerts that are old enough to judge, replays the exit policy over
//! their intrabar path and records exactly one settlement per alert. Alerts
//! without a path are deferred to a later pass.

use super::{horizon_returns, ExitPolicy, Settlement};
use crate::alert::AlertEvent;
use crate::config::SimulationConfig;
use crate::quote::{FetchError, QuoteSource};
use crate::store::Store;
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};
use chrono::{DateTime, Duration, Utc};
use std::time::Instant;

/// Counts of one settlement pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    /// Alerts inside the sync window
    pub considered: usize,
    /// Too recent to settle
    pub not_due: usize,
    pub already_settled: usize,
    pub created: usize,
    /// No intrabar data yet
    pub deferred: usize,
    /// Store errors; retried on the next pass
    pub failed: usize,
}

/// What happened to a single alert
#[derive(Debug)]
enum AlertOutcome {
    Created,
    Duplicate,
    Deferred(FetchError),
}

/// Settles due alerts
pub struct SettlementPass<'a, S: Store + ?Sized> {
    store: &'a S,
    quotes: &'a dyn QuoteSource,
    policy: ExitPolicy,
    sync_window: Duration,
    settle_after: Duration,
}

impl<'a, S: Store + ?Sized> SettlementPass<'a, S> {
    pub fn new(store: &'a S, quotes: &'a dyn QuoteSource, config: &SimulationConfig) -> Self {
        Self {
            store,
            quotes,
            policy: ExitPolicy::from(config),
            sync_window: Duration::days(config.sync_days),
            settle_after: Duration::hours(config.max_hold_hours.max(24)),
        }
    }

    /// Whether an alert sent at `sent_at` may be settled at `now`
    pub fn is_due(&self, sent_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - sent_at >= self.settle_after
    }

    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<SettlementReport> {
        let started = Instant::now();
        let alerts = self.store.alerts_since(now - self.sync_window).await?;
        let mut report = SettlementReport {
            considered: alerts.len(),
            ..Default::default()
        };

        for alert in &alerts {
            if !self.is_due(alert.sent_at, now) {
                report.not_due += 1;
                continue;
            }

            match self.store.settlement_exists(alert.id).await {
                Ok(true) => {
                    report.already_settled += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(alert_id = %alert.id, error = %e, "Settlement lookup failed");
                    continue;
                }
            }

            match self.settle(alert, now).await {
                Ok(AlertOutcome::Created) => {
                    report.created += 1;
                    increment(CounterMetric::SettlementsCreated, 1);
                }
                Ok(AlertOutcome::Duplicate) => report.already_settled += 1,
                Ok(AlertOutcome::Deferred(reason)) => {
                    report.deferred += 1;
                    increment(CounterMetric::SettlementsDeferred, 1);
                    tracing::debug!(symbol = %alert.symbol, %reason, "Settlement deferred");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(alert_id = %alert.id, error = %e, "Settlement write failed");
                }
            }
        }

        record_latency(LatencyMetric::SettlementPass, started.elapsed());
        tracing::info!(
            considered = report.considered,
            created = report.created,
            deferred = report.deferred,
            "Settlement pass complete"
        );
        Ok(report)
    }

    async fn settle(&self, alert: &AlertEvent, now: DateTime<Utc>) -> anyhow::Result<AlertOutcome> {
        let is_long = alert.kind.is_up();
        let path = match self
            .quotes
            .get_intrabar_path(
                &alert.symbol,
                alert.sent_at,
                alert.sent_at + self.settle_after,
                self.policy.interval_minutes,
            )
            .await
        {
            Ok(path) => path,
            Err(e) => return Ok(AlertOutcome::Deferred(e)),
        };

        let entry = self.policy.slipped_entry(alert.price_after, is_long);
        let Some(trade) = self.policy.simulate(entry, is_long, &path) else {
            return Ok(AlertOutcome::Deferred(FetchError::NoData));
        };
        let horizons = horizon_returns(alert.price_after, is_long, alert.sent_at, &path);
        let settlement = Settlement::new(alert, entry, trade, horizons, now);

        if self.store.insert_settlement(&settlement).await? {
            tracing::info!(
                symbol = %settlement.symbol,
                exit = %settlement.exit_reason,
                result_pct = %settlement.result_pct.round_dp(2),
                "Alert settled"
            );
            Ok(AlertOutcome::Created)
        } else {
            Ok(AlertOutcome::Duplicate)
        }
    }
}
