//! Settle command implementation

use super::open_store;
use crate::config::Config;
use crate::outcome::SettlementPass;
use crate::quote::YahooClient;
use crate::store::Store;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct SettleArgs {
    /// Override how many days back alerts are considered
    #[arg(long)]
    pub days: Option<i64>,
}

impl SettleArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut simulation = config.simulation.clone();
        if let Some(days) = self.days.filter(|d| *d > 0) {
            simulation.sync_days = days;
        }

        let quotes = YahooClient::new(config.quote_source.clone())?;
        let store = open_store(config).await?;
        let result = SettlementPass::new(&store, &quotes, &simulation)
            .run(Utc::now())
            .await;
        store.close().await;

        let report = result?;
        println!("Settlement complete");
        println!("  Considered:      {}", report.considered);
        println!("  Settled:         {}", report.created);
        println!("  Already settled: {}", report.already_settled);
        println!("  Not yet due:     {}", report.not_due);
        println!("  Deferred:        {}", report.deferred);
        if report.failed > 0 {
            println!("  Failed:          {}", report.failed);
        }
        Ok(())
    }
}
