//! Scan, settle and report against a SQLite store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use price_sentinel::alert::{AlertKind, PriceObservation};
use price_sentinel::config::{Config, StoreConfig};
use price_sentinel::notify::LogNotifier;
use price_sentinel::outcome::{aggregate, Category, ExitReason, SettlementPass, Verdict};
use price_sentinel::quote::{FetchError, IntrabarSample, Quote, QuoteBatch, QuoteSource};
use price_sentinel::scan::ScanRunner;
use price_sentinel::store::{SqliteStore, Store};
use price_sentinel::universe::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::TempDir;

/// Scripted market: fixed current prices and rising intrabar paths
#[derive(Default)]
struct ScriptedMarket {
    prices: HashMap<String, Decimal>,
}

#[async_trait]
impl QuoteSource for ScriptedMarket {
    async fn get_current(&self, symbols: &[String]) -> QuoteBatch {
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

    async fn get_historical_at(&self, _symbol: &str, _at: DateTime<Utc>) -> Result<Decimal, FetchError> {
        Err(FetchError::NoData)
    }

    async fn get_intrabar_path(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
        interval_minutes: i64,
    ) -> Result<Vec<IntrabarSample>, FetchError> {
        let base = *self.prices.get(symbol).ok_or(FetchError::NoData)?;
        Ok((0..24)
            .map(|i| {
                let close = base * (dec!(1) + Decimal::from(i) * dec!(0.002));
                IntrabarSample::new(
                    start + Duration::minutes(interval_minutes * i),
                    close * dec!(1.001),
                    close * dec!(0.999),
                    close,
                )
            })
            .collect())
    }
}

fn config(dir: &TempDir) -> Config {
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
    config.store = StoreConfig {
        database_url: format!("sqlite://{}?mode=rwc", dir.path().join("sentinel.db").display()),
        chunk_size: 2,
        max_connections: 2,
    };
    config
}

async fn seeded_store(config: &Config, symbols: &[&str]) -> SqliteStore {
    let store = SqliteStore::connect(&config.store).await.unwrap();
    for s in symbols {
        store.upsert_symbol(&Symbol::new(*s, None, "NASDAQ")).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_alert_is_settled_and_reported() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = seeded_store(&config, &["AAA", "BBB"]).await;
    let now = Utc::now();
    let scanned_at = now - Duration::hours(30);

    store
        .append_observations(&[PriceObservation {
            symbol: "AAA".into(),
            price: dec!(100),
            volume: None,
            timestamp: scanned_at - Duration::hours(2),
        }])
        .await
        .unwrap();
    let market = ScriptedMarket {
        prices: [("AAA".into(), dec!(110)), ("BBB".into(), dec!(20))].into(),
    };

    let scan = ScanRunner::new(&store, &market, &LogNotifier, &config)
        .run(scanned_at)
        .await
        .unwrap();
    assert_eq!(scan.fetched, 2);
    assert_eq!(scan.write.written, 2);
    let detection = scan.detection.unwrap();
    assert_eq!(detection.evaluated, 1);
    assert_eq!(detection.sent, 1);

    let alerts = store.alerts_since(now - Duration::days(2)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::VolumeSpikeUp);
    assert_eq!(alerts[0].volume_ratio, Some(dec!(5)));

    let pass = SettlementPass::new(&store, &market, &config.simulation);
    let settled = pass.run(now).await.unwrap();
    assert_eq!(settled.created, 1);
    let again = pass.run(now).await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.already_settled, 1);

    let settlements = store.settlements_since(now - Duration::days(7)).await.unwrap();
    store.close().await;

    assert_eq!(settlements.len(), 1);
    assert_eq!(settlements[0].exit_reason, ExitReason::TakeProfit);
    assert_eq!(settlements[0].result_pct, dec!(3));

    let stats = aggregate(&settlements, 5);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.category(Category::VolumeSpike).unwrap().count, 1);
    assert_eq!(stats.category(Category::Extreme).unwrap().count, 0);
    assert_eq!(stats.verdict, Verdict::Profitable);
    assert_eq!(stats.best[0].symbol, "AAA");
}

#[tokio::test]
async fn test_quarantined_symbol_leaves_rotation_until_expiry() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = seeded_store(&config, &["AAA", "BBB", "CCC"]).await;
    let market = ScriptedMarket {
        prices: [("AAA".into(), dec!(10)), ("BBB".into(), dec!(20))].into(),
    };
    let runner = ScanRunner::new(&store, &market, &LogNotifier, &config);
    let t0 = Utc::now();

    let first = runner.run(t0).await.unwrap();
    assert_eq!(first.scheduled, 3);
    assert_eq!(first.quarantine.quarantined, vec!["CCC".to_string()]);

    let second = runner.run(t0 + Duration::minutes(15)).await.unwrap();
    assert_eq!(second.active, 2);
    assert_eq!(second.scheduled, 2);
    assert!(second.quarantine.quarantined.is_empty());

    let after_expiry = runner.run(t0 + Duration::days(8)).await.unwrap();
    assert_eq!(after_expiry.active, 3);
    assert_eq!(after_expiry.scheduled, 3);
    store.close().await;
}
