//! Alerts command implementation

use super::{build_notifier, open_store};
use crate::config::Config;
use crate::notify::format_test_message;
use crate::store::{SqliteStore, Store};
use chrono::Utc;
use clap::{Args, Subcommand};
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Subcommand, Debug)]
pub enum AlertsCommand {
    /// List all alert configs, enabled or not
    List,
    /// Add or re-enable a per-symbol threshold
    Add {
        /// Ticker symbol
        symbol: String,
        /// Threshold percent; defaults to detection.default_threshold_pct
        threshold: Option<Decimal>,
    },
    /// Disable the threshold of a symbol
    Remove {
        /// Ticker symbol
        symbol: String,
    },
    /// Send a test message through the notification channel
    Test,
}

impl AlertsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if let AlertsCommand::Test = self.command {
            let notifier = build_notifier(config)?;
            if notifier.send(&format_test_message()).await {
                println!("Test message sent");
            } else {
                println!("Test message failed, check the logs");
            }
            return Ok(());
        }

        let store = open_store(config).await?;
        let result = self.run(&store, config).await;
        store.close().await;
        result
    }

    async fn run(&self, store: &SqliteStore, config: &Config) -> anyhow::Result<()> {
        match &self.command {
            AlertsCommand::List => {
                let configs = store.alert_configs().await?;
                if configs.is_empty() {
                    println!("No alert configs");
                    return Ok(());
                }
                println!("{:<10} {:>10} {:>8}  Created", "Symbol", "Threshold", "Enabled");
                println!("{}", "─".repeat(54));
                for c in &configs {
                    println!(
                        "{:<10} {:>9}% {:>8}  {}",
                        c.symbol,
                        c.threshold_pct.round_dp(2),
                        if c.enabled { "yes" } else { "no" },
                        c.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            AlertsCommand::Add { symbol, threshold } => {
                let symbol = symbol.trim().to_uppercase();
                let threshold = threshold.unwrap_or(config.detection.default_threshold_pct);
                if threshold <= Decimal::ZERO {
                    anyhow::bail!("threshold must be positive, got {}", threshold);
                }
                store.upsert_alert_config(&symbol, threshold, Utc::now()).await?;
                println!("Alert enabled for {} at {}%", symbol, threshold);
            }
            AlertsCommand::Remove { symbol } => {
                let symbol = symbol.trim().to_uppercase();
                if store.disable_alert_config(&symbol).await? {
                    println!("Alert disabled for {}", symbol);
                } else {
                    println!("No alert config for {}", symbol);
                }
            }
            AlertsCommand::Test => {}
        }
        Ok(())
    }
}
