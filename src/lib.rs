//! price-sentinel: rotating price scanner with volume-confirmed alerts
//!
//! This library provides the core components for:
//! - Symbol universe rotation with quarantine of failing tickers
//! - Batched quote fetching under a per-run time budget
//! - Volume-confirmed and extreme-move alert detection with cooldown
//! - Alert delivery to a notification channel
//! - Trade outcome simulation (take profit, stop loss, trailing stop)
//! - Performance aggregation and reporting
//! - SQLite persistence with chunked, retried writes
//! - Structured logging and Prometheus metrics

pub mod alert;
pub mod cli;
pub mod config;
pub mod notify;
pub mod outcome;
pub mod quote;
pub mod scan;
pub mod store;
pub mod telemetry;
pub mod universe;
