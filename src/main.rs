use clap::Parser;
use tickbot::cli::{Cli, Commands};
use tickbot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    tickbot::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting profit manager");
            args.execute(&config).await?;
        }
        Commands::Watch(args) => {
            tracing::info!("Starting tick stream");
            args.execute(&config).await?;
        }
        Commands::Price(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {} {}", config.feed.exchange, config.feed.pair);
            println!(
                "  Trading: fee={}, sell_min={}, trend sample={}",
                config.trading.fee_rate,
                config.trading.sell_min,
                config.trading.emergency_sell_sample
            );
            println!("  Execution: {:?}", config.execution.mode);
            println!("  Ledger ({}):", config.ledger.quote_currency);
            for (currency, balance) in &config.ledger.balances {
                println!("    {}: {}", currency, balance);
            }
        }
    }

    Ok(())
}
