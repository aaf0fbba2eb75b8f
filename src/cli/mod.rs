//! CLI interface for price-sentinel
//!
//! Provides subcommands for:
//! - `scan`: Sample one rotation slice and emit alerts
//! - `alerts`: Manage per-symbol alert thresholds
//! - `settle`: Simulate and settle due alerts
//! - `report`: Print the performance report
//! - `symbols`: Seed the symbol universe
//! - `config`: Show effective configuration

mod alerts;
mod report;
mod scan;
mod settle;
mod symbols;

pub use alerts::{AlertsArgs, AlertsCommand};
pub use report::ReportArgs;
pub use scan::ScanArgs;
pub use settle::SettleArgs;
pub use symbols::{SymbolsArgs, SymbolsCommand};

use crate::config::Config;
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::store::SqliteStore;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "price-sentinel")]
#[command(about = "Rotating price scanner with volume-confirmed alerts and outcome tracking")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample one rotation slice, persist, quarantine and alert
    Scan(ScanArgs),
    /// Manage per-symbol alert thresholds
    Alerts(AlertsArgs),
    /// Settle alerts whose outcome window has passed
    Settle(SettleArgs),
    /// Print the alert performance report
    Report(ReportArgs),
    /// Manage the symbol universe
    Symbols(SymbolsArgs),
    /// Show effective configuration
    Config,
}

/// Notifier for the configured channel; fails on missing credentials
pub(crate) fn build_notifier(config: &Config) -> anyhow::Result<Box<dyn Notifier>> {
    match config.telegram_credentials()? {
        Some(credentials) => Ok(Box::new(TelegramNotifier::new(&config.notify, credentials)?)),
        None => {
            tracing::info!("Notifications disabled, alerts are logged only");
            Ok(Box::new(LogNotifier))
        }
    }
}

/// Open the configured store
pub(crate) async fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    Ok(SqliteStore::connect(&config.store).await?)
}
