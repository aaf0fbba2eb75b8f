//! Report command implementation

use super::{build_notifier, open_store};
use crate::config::Config;
use crate::outcome::aggregate;
use crate::store::Store;
use chrono::{Duration, Utc};
use clap::Args;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Days of settled alerts to include
    #[arg(long)]
    pub days: Option<i64>,

    /// Also send the report through the notification channel
    #[arg(long)]
    pub send: bool,
}

impl ReportArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let days = self.days.unwrap_or(config.report.days).max(1);
        let notifier = if self.send {
            Some(build_notifier(config)?)
        } else {
            None
        };

        let store = open_store(config).await?;
        let result = store.settlements_since(Utc::now() - Duration::days(days)).await;
        store.close().await;

        let stats = aggregate(&result?, config.report.top_n);
        println!("{}", stats.format_table(days));

        if let Some(notifier) = notifier {
            if notifier.send(&stats.format_message(days)).await {
                println!("Report sent");
            } else {
                println!("Report could not be sent");
            }
        }
        Ok(())
    }
}
