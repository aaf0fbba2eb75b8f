//! Symbols command implementation

use super::open_store;
use crate::config::Config;
use crate::store::Store;
use crate::universe::{load_universe, Symbol};
use chrono::Utc;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct SymbolsArgs {
    #[command(subcommand)]
    pub command: SymbolsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SymbolsCommand {
    /// Add a symbol to the universe, or update its name and exchange
    Add {
        /// Ticker symbol
        symbol: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Listing exchange
        #[arg(long, default_value = "NASDAQ")]
        exchange: String,
    },
    /// Show universe size and quarantine count
    Status,
}

impl SymbolsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(config).await?;
        let result = match &self.command {
            SymbolsCommand::Add {
                symbol,
                name,
                exchange,
            } => {
                let symbol = Symbol::new(symbol.trim(), name.clone(), exchange.as_str());
                store
                    .upsert_symbol(&symbol)
                    .await
                    .map(|_| println!("Symbol {} saved", symbol.symbol))
                    .map_err(anyhow::Error::from)
            }
            SymbolsCommand::Status => load_universe(&store, config.rotation.page_size)
                .await
                .map(|universe| {
                    let now = Utc::now();
                    let active = universe.iter().filter(|s| s.is_active(now)).count();
                    println!("Universe:    {}", universe.len());
                    println!("Active:      {}", active);
                    println!("Quarantined: {}", universe.len() - active);
                }),
        };
        store.close().await;
        result
    }
}
