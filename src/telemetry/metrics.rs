//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Symbols attempted by a scan
    SymbolsScanned,
    /// Usable quotes received
    QuotesFetched,
    /// Per-symbol fetch failures
    FetchFailures,
    /// Symbols placed in quarantine
    SymbolsQuarantined,
    /// Alerts delivered and recorded
    AlertsSent,
    /// Alerts whose notification failed
    NotificationsFailed,
    /// Alert writes lost after a successful send
    AlertWritesFailed,
    /// Settlements created
    SettlementsCreated,
    /// Alerts left for a later settlement pass
    SettlementsDeferred,
    /// Observation rows dropped by the chunk writer
    RowsDropped,
    /// Store connections recreated
    StoreReconnects,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Symbols eligible for rotation
    ActiveSymbols,
    /// Rotation phase of the last scan
    RotationOffset,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One quote batch round-trip
    QuoteBatch,
    /// Whole scan pass
    ScanPass,
    /// Whole settlement pass
    SettlementPass,
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    let metric_name = match metric {
        CounterMetric::SymbolsScanned => "sentinel_symbols_scanned_total",
        CounterMetric::QuotesFetched => "sentinel_quotes_fetched_total",
        CounterMetric::FetchFailures => "sentinel_fetch_failures_total",
        CounterMetric::SymbolsQuarantined => "sentinel_symbols_quarantined_total",
        CounterMetric::AlertsSent => "sentinel_alerts_sent_total",
        CounterMetric::NotificationsFailed => "sentinel_notifications_failed_total",
        CounterMetric::AlertWritesFailed => "sentinel_alert_writes_failed_total",
        CounterMetric::SettlementsCreated => "sentinel_settlements_created_total",
        CounterMetric::SettlementsDeferred => "sentinel_settlements_deferred_total",
        CounterMetric::RowsDropped => "sentinel_rows_dropped_total",
        CounterMetric::StoreReconnects => "sentinel_store_reconnects_total",
    };

    metrics::counter!(metric_name).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::ActiveSymbols => "sentinel_active_symbols",
        GaugeMetric::RotationOffset => "sentinel_rotation_offset",
    };

    metrics::gauge!(metric_name).set(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::QuoteBatch => "sentinel_quote_batch_latency_ms",
        LatencyMetric::ScanPass => "sentinel_scan_pass_latency_ms",
        LatencyMetric::SettlementPass => "sentinel_settlement_pass_latency_ms",
    };

    tracing::debug!(
        metric = metric_name,
        value_ms = duration.as_millis() as u64,
        "Recording latency"
    );
    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Install the Prometheus recorder with an HTTP listener on `port`
pub(super) fn init_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    Ok(())
}
