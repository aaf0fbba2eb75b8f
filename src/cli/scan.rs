//! Scan command implementation

use super::{build_notifier, open_store};
use crate::config::Config;
use crate::quote::YahooClient;
use crate::scan::{ScanReport, ScanRunner};
use crate::store::Store;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Override the number of symbols sampled this run
    #[arg(long)]
    pub slice_size: Option<usize>,
}

impl ScanArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(size) = self.slice_size.filter(|s| *s > 0) {
            config.rotation.slice_size = size;
        }

        let notifier = build_notifier(&config)?;
        let quotes = YahooClient::new(config.quote_source.clone())?;
        let store = open_store(&config).await?;

        let result = ScanRunner::new(&store, &quotes, notifier.as_ref(), &config)
            .run(Utc::now())
            .await;
        store.close().await;

        print_report(&result?);
        Ok(())
    }
}

fn print_report(report: &ScanReport) {
    println!("Scan complete");
    println!(
        "  Slice:        offset {} of {} active ({} scheduled)",
        report.offset, report.active, report.scheduled
    );
    println!(
        "  Fetched:      {} of {} ({} failed, {} batches skipped)",
        report.fetched, report.attempted, report.failed, report.batches_skipped
    );
    println!(
        "  Stored:       {} rows ({} dropped, {} reconnects)",
        report.write.written, report.write.dropped, report.write.reconnects
    );
    println!(
        "  Quarantined:  {} ({} recovered)",
        report.quarantine.quarantined.len(),
        report.quarantine.recovered
    );
    println!("  Pruned:       {}", report.pruned);
    match &report.detection {
        Some(d) => println!(
            "  Alerts:       {} sent, {} notify failed, {} in cooldown",
            d.sent, d.notify_failed, d.cooling_down
        ),
        None => println!("  Alerts:       detection skipped"),
    }
}
