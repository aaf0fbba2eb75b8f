//! Detection pass
//!
//! One run of the detector against the store: read thresholds and the
//! cooldown set, classify, then notify and record each candidate. The
//! cooldown read always happens before any alert of the same pass is
//! written.

use super::{AlertDetector, DetectionInput, DetectionParams, PriceObservation};
use crate::config::DetectionConfig;
use crate::notify::{format_alert_message, Notifier};
use crate::store::{with_retry, Store};
use crate::telemetry::{increment, CounterMetric};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Counts of one detection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    /// Symbols with both a current and a baseline observation
    pub evaluated: usize,
    /// Symbols inside their cooldown window
    pub cooling_down: usize,
    /// Classified moves that passed the cooldown gate
    pub candidates: usize,
    /// Notified and recorded
    pub sent: usize,
    /// Notification failed; nothing recorded
    pub notify_failed: usize,
    /// Notified but the alert row could not be written
    pub write_failed: usize,
}

/// Runs detection, notification and alert persistence
pub struct DetectionPass<'a, S: Store + ?Sized> {
    store: &'a S,
    notifier: &'a dyn Notifier,
    detector: AlertDetector,
    cooldown: Duration,
}

impl<'a, S: Store + ?Sized> DetectionPass<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier, config: &DetectionConfig) -> Self {
        Self {
            store,
            notifier,
            detector: AlertDetector::new(DetectionParams::from(config)),
            cooldown: config.cooldown(),
        }
    }

    /// Detect and emit alerts for the observations of this run.
    ///
    /// Fails only when thresholds or the cooldown set cannot be read; per
    /// alert failures are counted in the report.
    pub async fn run(
        &self,
        current: &HashMap<String, PriceObservation>,
        baseline: &HashMap<String, PriceObservation>,
        avg_volume: &HashMap<String, u64>,
        names: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DetectionReport> {
        let thresholds: HashMap<String, Decimal> = self
            .store
            .alert_configs()
            .await?
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| (c.symbol, c.threshold_pct))
            .collect();
        let cooldown = self.store.symbols_alerted_since(now - self.cooldown).await?;

        let input = DetectionInput {
            current,
            baseline,
            avg_volume,
            cooldown: &cooldown,
            thresholds: &thresholds,
        };
        let candidates = self.detector.detect(&input);

        let mut report = DetectionReport {
            evaluated: current.keys().filter(|s| baseline.contains_key(*s)).count(),
            cooling_down: current.keys().filter(|s| cooldown.contains(*s)).count(),
            candidates: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let name = names.get(&candidate.symbol).map(String::as_str);
            let message = format_alert_message(&candidate, name, now);

            if !self.notifier.send(&message).await {
                report.notify_failed += 1;
                increment(CounterMetric::NotificationsFailed, 1);
                tracing::warn!(symbol = %candidate.symbol, kind = %candidate.kind, "Alert notification failed");
                continue;
            }

            let event = candidate.into_event(now);
            match with_retry("append_alert", || self.store.append_alert(&event)).await {
                Ok(()) => {
                    report.sent += 1;
                    increment(CounterMetric::AlertsSent, 1);
                    tracing::info!(
                        symbol = %event.symbol,
                        kind = %event.kind,
                        change_pct = %event.percent_change.round_dp(2),
                        "Alert sent"
                    );
                }
                Err(e) => {
                    report.write_failed += 1;
                    increment(CounterMetric::AlertWritesFailed, 1);
                    tracing::error!(symbol = %event.symbol, error = %e, "Alert sent but not recorded");
                }
            }
        }

        Ok(report)
    }
}
