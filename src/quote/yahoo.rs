//! Yahoo Finance chart API client
//!
//! Uses the v8 chart endpoint for both current quotes (daily bars plus the
//! `meta` block) and intrabar paths. Requests inside a batch run
//! concurrently up to the configured limit; each one is bounded by the
//! client timeout so a slow symbol degrades to a `FetchError`.

use super::{FetchError, IntrabarSample, Quote, QuoteBatch, QuoteSource};
use crate::config::QuoteSourceConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Client for the Yahoo Finance chart API
pub struct YahooClient {
    config: QuoteSourceConfig,
    client: Client,
}

impl YahooClient {
    /// Create a new client with the given configuration
    pub fn new(config: QuoteSourceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; price-sentinel)")
            .build()?;
        Ok(Self { config, client })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.config.base_url, symbol)
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        query: &[(&str, String)],
    ) -> Result<ChartResult, FetchError> {
        let response = self
            .client
            .get(self.chart_url(symbol))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(FetchError::NoData);
        }
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        parse_chart(&body)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let chart = self
            .fetch_chart(
                symbol,
                &[("range", "1mo".to_string()), ("interval", "1d".to_string())],
            )
            .await?;
        quote_from_chart(symbol, &chart, Utc::now())
    }
}

/// Parse a chart response body into its first result
fn parse_chart(body: &str) -> Result<ChartResult, FetchError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if let Some(err) = envelope.chart.error {
        tracing::debug!(code = %err.code, description = ?err.description, "Chart API error");
        return Err(FetchError::NoData);
    }

    envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(FetchError::NoData)
}

fn to_decimal(v: f64) -> Option<Decimal> {
    Decimal::from_f64(v).map(|d| d.round_dp(6))
}

/// Build a quote from a daily chart: price and volume from `meta`, average
/// volume from the completed daily bars (today's partial bar excluded).
fn quote_from_chart(
    symbol: &str,
    chart: &ChartResult,
    fallback_ts: DateTime<Utc>,
) -> Result<Quote, FetchError> {
    let price = chart
        .meta
        .regular_market_price
        .and_then(to_decimal)
        .ok_or(FetchError::NoData)?;

    let series = chart.indicators.quote.first();
    let avg_volume = series.and_then(|s| {
        let completed = &s.volume[..s.volume.len().saturating_sub(1)];
        let vols: Vec<u64> = completed.iter().flatten().copied().collect();
        if vols.is_empty() {
            None
        } else {
            Some(vols.iter().sum::<u64>() / vols.len() as u64)
        }
    });

    let timestamp = chart
        .meta
        .regular_market_time
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .unwrap_or(fallback_ts);

    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        volume: chart.meta.regular_market_volume,
        avg_volume,
        timestamp,
    })
}

/// Zip a chart's parallel arrays into bars, skipping bars with gaps
fn samples_from_chart(chart: &ChartResult) -> Vec<IntrabarSample> {
    let Some(series) = chart.indicators.quote.first() else {
        return vec![];
    };

    chart
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let high = series.high.get(i).copied().flatten().and_then(to_decimal)?;
            let low = series.low.get(i).copied().flatten().and_then(to_decimal)?;
            let close = series.close.get(i).copied().flatten().and_then(to_decimal)?;
            let timestamp = Utc.timestamp_opt(*ts, 0).single()?;
            Some(IntrabarSample::new(timestamp, high, low, close))
        })
        .collect()
}

#[async_trait]
impl QuoteSource for YahooClient {
    async fn get_current(&self, symbols: &[String]) -> QuoteBatch {
        let concurrency = self.config.concurrency.max(1);
        let requests: Vec<_> = symbols
            .iter()
            .cloned()
            .map(|symbol| async move {
                let result = self.fetch_quote(&symbol).await;
                (symbol, result)
            })
            .collect();
        let returned: HashMap<String, Result<Quote, FetchError>> = stream::iter(requests)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        QuoteBatch::from_results(symbols, returned)
    }

    async fn get_historical_at(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Decimal, FetchError> {
        let chart = self
            .fetch_chart(
                symbol,
                &[
                    ("period1", (at - Duration::days(4)).timestamp().to_string()),
                    ("period2", (at + Duration::minutes(5)).timestamp().to_string()),
                    ("interval", "5m".to_string()),
                ],
            )
            .await?;

        samples_from_chart(&chart)
            .into_iter()
            .take_while(|s| s.timestamp <= at)
            .last()
            .map(|s| s.close)
            .ok_or(FetchError::NoData)
    }

    async fn get_intrabar_path(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: i64,
    ) -> Result<Vec<IntrabarSample>, FetchError> {
        let chart = self
            .fetch_chart(
                symbol,
                &[
                    ("period1", start.timestamp().to_string()),
                    ("period2", end.timestamp().to_string()),
                    ("interval", format!("{interval_minutes}m")),
                ],
            )
            .await?;

        let path: Vec<IntrabarSample> = samples_from_chart(&chart)
            .into_iter()
            .filter(|s| s.timestamp >= start && s.timestamp < end)
            .collect();

        tracing::debug!(symbol, bars = path.len(), "Fetched intrabar path");
        Ok(path)
    }
}
