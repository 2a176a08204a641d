//! CLI interface for tickbot
//!
//! Provides subcommands for:
//! - `run`: Stream a pair and manage positions with the profit manager
//! - `watch`: Stream ticks to stdout and optionally a CSV log
//! - `price`: Look up a spot price over REST
//! - `config`: Show configuration

mod price;
mod reporter;
mod run;
mod watch;

pub use price::PriceArgs;
pub use reporter::TickReporter;
pub use run::RunArgs;
pub use watch::WatchArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tickbot")]
#[command(about = "Live ticker ingestion and profit-taking engine for crypto trading bots")]
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
    /// Stream a pair and sell positions per the profit policy
    Run(RunArgs),
    /// Stream ticks without trading
    Watch(WatchArgs),
    /// Print the current spot price of a pair
    Price(PriceArgs),
    /// Show configuration
    Config,
}
