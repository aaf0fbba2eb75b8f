//! Scan pass
//!
//! One run of the sampler: pick this slot's rotation slice, fetch quotes in
//! budgeted batches, persist observations, update the quarantine ledger,
//! prune old observations and run detection.

use crate::alert::{DetectionPass, DetectionReport, PriceObservation};
use crate::config::Config;
use crate::notify::Notifier;
use crate::quote::{QuoteBatch, QuoteSource};
use crate::store::{write_chunks, Store, WriteReport};
use crate::telemetry::{
    increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use crate::universe::{load_universe, select_slice, QuarantineLedger, QuarantineOutcome, Symbol};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

/// Counts of one scan pass
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub offset: usize,
    pub active: usize,
    /// Symbols in the slice
    pub scheduled: usize,
    /// Symbols whose batch actually ran
    pub attempted: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Batches not started because the budget ran low
    pub batches_skipped: usize,
    pub write: WriteReport,
    pub quarantine: QuarantineOutcome,
    pub pruned: u64,
    /// `None` when detection could not read its inputs
    pub detection: Option<DetectionReport>,
}

/// Runs scan passes against one store, quote source and notifier
pub struct ScanRunner<'a, S: Store> {
    store: &'a S,
    quotes: &'a dyn QuoteSource,
    notifier: &'a dyn Notifier,
    config: &'a Config,
}

impl<'a, S: Store> ScanRunner<'a, S> {
    pub fn new(
        store: &'a S,
        quotes: &'a dyn QuoteSource,
        notifier: &'a dyn Notifier,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            quotes,
            notifier,
            config,
        }
    }

    /// Run one pass. Fails only when the symbol universe cannot be read.
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<ScanReport> {
        let started = Instant::now();
        let universe = load_universe(self.store, self.config.rotation.page_size).await?;
        let slice = select_slice(&universe, &self.config.rotation, now);
        set_gauge(GaugeMetric::ActiveSymbols, slice.active_count as f64);
        set_gauge(GaugeMetric::RotationOffset, slice.offset as f64);
        tracing::info!(
            offset = slice.offset,
            active = slice.active_count,
            scheduled = slice.len(),
            "Selected rotation slice"
        );

        let mut report = ScanReport {
            offset: slice.offset,
            active: slice.active_count,
            scheduled: slice.len(),
            ..Default::default()
        };

        let (batch, attempted) = self.fetch_budgeted(&slice.symbols, started, &mut report).await;
        report.attempted = attempted.len();
        report.fetched = batch.quotes().count();
        report.failed = batch.failures().count();
        increment(CounterMetric::SymbolsScanned, report.attempted as u64);
        increment(CounterMetric::QuotesFetched, report.fetched as u64);
        increment(CounterMetric::FetchFailures, report.failed as u64);
        for (symbol, reason) in batch.failures() {
            tracing::debug!(%symbol, %reason, "No usable quote");
        }

        let current: HashMap<String, PriceObservation> = batch
            .quotes()
            .map(|q| {
                let obs = PriceObservation {
                    timestamp: now,
                    ..PriceObservation::from(q)
                };
                (q.symbol.clone(), obs)
            })
            .collect();
        let avg_volume: HashMap<String, u64> = batch
            .quotes()
            .filter_map(|q| q.avg_volume.map(|v| (q.symbol.clone(), v)))
            .collect();

        // Baselines are read before this run's rows are written
        let baseline = self.baselines(&current, now).await;

        let mut rows: Vec<PriceObservation> = current.values().cloned().collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.write = write_chunks(self.store, &rows, self.config.store.chunk_size).await;

        let ledger = QuarantineLedger::new(&self.config.quarantine);
        report.quarantine = ledger
            .apply(self.store, &attempted, &batch.fetched_symbols(), now)
            .await;
        increment(
            CounterMetric::SymbolsQuarantined,
            report.quarantine.quarantined.len() as u64,
        );

        let cutoff = now - Duration::hours(self.config.detection.retention_hours);
        match self.store.prune_observations(cutoff).await {
            Ok(n) => report.pruned = n,
            Err(e) => tracing::warn!(error = %e, "Observation pruning failed"),
        }

        let names: HashMap<String, String> = attempted
            .iter()
            .filter_map(|s| s.name.clone().map(|n| (s.symbol.clone(), n)))
            .collect();
        let pass = DetectionPass::new(self.store, self.notifier, &self.config.detection);
        match pass.run(&current, &baseline, &avg_volume, &names, now).await {
            Ok(detection) => report.detection = Some(detection),
            Err(e) => tracing::error!(error = %e, "Detection skipped"),
        }

        record_latency(LatencyMetric::ScanPass, started.elapsed());
        Ok(report)
    }

    /// Fetch the slice batch by batch until the budget runs low
    async fn fetch_budgeted(
        &self,
        symbols: &[Symbol],
        started: Instant,
        report: &mut ScanReport,
    ) -> (QuoteBatch, Vec<Symbol>) {
        let source = &self.config.quote_source;
        let budget = StdDuration::from_secs(self.config.run.budget_secs);
        let margin = StdDuration::from_secs(self.config.run.safety_margin_secs);
        let batches: Vec<&[Symbol]> = symbols.chunks(source.batch_size.max(1)).collect();

        let mut merged = QuoteBatch::default();
        let mut attempted = Vec::new();

        for (i, chunk) in batches.iter().enumerate() {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining < margin {
                report.batches_skipped = batches.len() - i;
                tracing::warn!(
                    skipped = report.batches_skipped,
                    remaining_secs = remaining.as_secs(),
                    "Run budget low, skipping remaining batches"
                );
                break;
            }
            if i > 0 && source.batch_pause_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(source.batch_pause_ms)).await;
            }

            let tickers: Vec<String> = chunk.iter().map(|s| s.symbol.clone()).collect();
            let batch_started = Instant::now();
            let batch = self.quotes.get_current(&tickers).await;
            record_latency(LatencyMetric::QuoteBatch, batch_started.elapsed());
            tracing::debug!(
                batch = i,
                requested = tickers.len(),
                fetched = batch.quotes().count(),
                "Fetched quote batch"
            );

            merged.extend(batch);
            attempted.extend(chunk.iter().cloned());
        }

        (merged, attempted)
    }

    /// Stored baselines, optionally completed from the quote source
    async fn baselines(
        &self,
        current: &HashMap<String, PriceObservation>,
        now: DateTime<Utc>,
    ) -> HashMap<String, PriceObservation> {
        let at = now - self.config.detection.lookback();
        let symbols: Vec<String> = current.keys().cloned().collect();
        let mut baseline = match self.store.baselines_at(&symbols, at).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "Baseline read failed");
                HashMap::new()
            }
        };

        if self.config.detection.fetch_missing_baseline {
            let missing: Vec<String> = symbols
                .into_iter()
                .filter(|s| !baseline.contains_key(s))
                .collect();
            for symbol in &missing {
                match self.quotes.get_historical_at(symbol, at).await {
                    Ok(price) => {
                        baseline.insert(
                            symbol.clone(),
                            PriceObservation {
                                symbol: symbol.clone(),
                                price,
                                volume: None,
                                timestamp: at,
                            },
                        );
                    }
                    Err(e) => tracing::debug!(%symbol, error = %e, "No historical baseline"),
                }
            }
        }

        baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::quote::{FetchError, IntrabarSample, Quote};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Quote source with fixed prices; unknown symbols are omitted
    #[derive(Default)]
    struct FixedQuotes {
        prices: HashMap<String, Decimal>,
        historical: HashMap<String, Decimal>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn get_current(&self, symbols: &[String]) -> QuoteBatch {
            *self.calls.lock().unwrap() += 1;
            let returned = symbols
                .iter()
                .filter_map(|s| {
                    self.prices.get(s).map(|p| {
                        let quote = Quote {
                            symbol: s.clone(),
                            price: *p,
                            volume: Some(50_000),
                            avg_volume: Some(10_000),
                            timestamp: Utc::now(),
                        };
                        (s.clone(), Ok(quote))
                    })
                })
                .collect();
            QuoteBatch::from_results(symbols, returned)
        }

        async fn get_historical_at(
            &self,
            symbol: &str,
            _at: DateTime<Utc>,
        ) -> Result<Decimal, FetchError> {
            self.historical.get(symbol).copied().ok_or(FetchError::NoData)
        }

        async fn get_intrabar_path(
            &self,
            _symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _interval_minutes: i64,
        ) -> Result<Vec<IntrabarSample>, FetchError> {
            Err(FetchError::NoData)
        }
    }

    fn config() -> Config {
        let mut config = Config::from_toml(
            r#"
            [rotation]
            slice_size = 10

            [quote_source]
            batch_size = 2
            batch_pause_ms = 0

            [notify]
            enabled = false

            [store]
            database_url = "sqlite::memory:"

            [telemetry]
            log_level = "info"
            "#,
        )
        .unwrap();
        config.store.chunk_size = 2;
        config
    }

    async fn seeded_store(symbols: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for s in symbols {
            store.insert_symbol(Symbol::new(*s, None, "NASDAQ")).await;
        }
        store
    }

    #[tokio::test]
    async fn test_scan_persists_quarantines_and_alerts() {
        let store = seeded_store(&["AAA", "BBB", "CCC"]).await;
        let now = Utc::now();
        store
            .append_observations(&[PriceObservation {
                symbol: "AAA".into(),
                price: dec!(100),
                volume: None,
                timestamp: now - Duration::hours(2),
            }])
            .await
            .unwrap();
        let quotes = FixedQuotes {
            prices: [("AAA".into(), dec!(110)), ("BBB".into(), dec!(20))].into(),
            ..Default::default()
        };

        let config = config();
        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(now)
            .await
            .unwrap();

        assert_eq!(report.scheduled, 3);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.write.written, 2);
        assert_eq!(report.quarantine.quarantined, vec!["CCC".to_string()]);
        assert_eq!(*quotes.calls.lock().unwrap(), 2);

        let detection = report.detection.unwrap();
        assert_eq!(detection.sent, 1);
        assert_eq!(store.alerts().await[0].symbol, "AAA");

        let ccc = store.symbols().await.into_iter().find(|s| s.symbol == "CCC").unwrap();
        assert!(!ccc.is_active(now));
    }

    #[tokio::test]
    async fn test_low_budget_skips_batches_without_verdicts() {
        let store = seeded_store(&["AAA", "BBB", "CCC"]).await;
        let quotes = FixedQuotes::default();
        let mut config = config();
        config.run.budget_secs = 0;
        config.run.safety_margin_secs = 1;

        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(Utc::now())
            .await
            .unwrap();
        assert_eq!(report.batches_skipped, 2);
        assert_eq!(report.attempted, 0);
        assert!(report.quarantine.quarantined.is_empty());
        assert!(store.symbols().await.iter().all(|s| s.quarantine_until.is_none()));
    }

    #[tokio::test]
    async fn test_missing_baseline_fetched_when_enabled() {
        let store = seeded_store(&["AAA"]).await;
        let quotes = FixedQuotes {
            prices: [("AAA".into(), dec!(120))].into(),
            historical: [("AAA".into(), dec!(100))].into(),
            ..Default::default()
        };
        let mut config = config();

        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(Utc::now())
            .await
            .unwrap();
        assert_eq!(report.detection.unwrap().evaluated, 0);

        config.detection.fetch_missing_baseline = true;
        let store = seeded_store(&["AAA"]).await;
        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(Utc::now())
            .await
            .unwrap();
        let detection = report.detection.unwrap();
        assert_eq!(detection.evaluated, 1);
        assert_eq!(detection.sent, 1);
    }

    #[tokio::test]
    async fn test_historical_fallback_fills_only_known_symbols() {
        let store = seeded_store(&["AAA", "BBB"]).await;
        let quotes = FixedQuotes {
            prices: [("AAA".into(), dec!(120)), ("BBB".into(), dec!(30))].into(),
            historical: [("AAA".into(), dec!(100))].into(),
            ..Default::default()
        };
        let mut config = config();
        config.detection.fetch_missing_baseline = true;

        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(Utc::now())
            .await
            .unwrap();
        let detection = report.detection.unwrap();
        assert_eq!(detection.evaluated, 1);
        assert_eq!(store.alerts().await[0].symbol, "AAA");
    }

    #[tokio::test]
    async fn test_old_observations_are_pruned() {
        let store = seeded_store(&["AAA"]).await;
        let now = Utc::now();
        store
            .append_observations(&[PriceObservation {
                symbol: "AAA".into(),
                price: dec!(1),
                volume: None,
                timestamp: now - Duration::hours(30),
            }])
            .await
            .unwrap();
        let quotes = FixedQuotes::default();
        let config = config();

        let report = ScanRunner::new(&store, &quotes, &LogNotifier, &config)
            .run(now)
            .await
            .unwrap();
        assert_eq!(report.pruned, 1);
    }
}
