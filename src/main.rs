use clap::Parser;
use price_sentinel::cli::{Cli, Commands};
use price_sentinel::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; the bundled example stands in only for a missing file
    let config = Config::load_or(&cli.config, include_str!("../config.toml.example"))?;

    // Initialize telemetry
    let _telemetry = price_sentinel::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Scan(args) => {
            tracing::info!("Starting scan pass");
            args.execute(&config).await?;
        }
        Commands::Alerts(args) => args.execute(&config).await?,
        Commands::Settle(args) => {
            tracing::info!("Starting settlement pass");
            args.execute(&config).await?;
        }
        Commands::Report(args) => args.execute(&config).await?,
        Commands::Symbols(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("Current configuration:");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
