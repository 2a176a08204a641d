//! Configuration types for tickbot

use crate::execution::{LocalLedger, DEFAULT_QUOTE_CURRENCY};
use crate::feed::{Exchange, FeedOptions};
use crate::risk::ProfitConfig;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Price feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_exchange")]
    pub exchange: Exchange,
    #[serde(default = "default_pair")]
    pub pair: String,
    /// Websocket endpoint override
    pub ws_url: Option<String>,
    /// CSV file receiving every tick
    pub log_path: Option<PathBuf>,
    /// Keep at most this many ticks in memory
    pub buffer_size: Option<usize>,
}

fn default_exchange() -> Exchange {
    Exchange::CoinbasePro
}
fn default_pair() -> String {
    "BTC-USD".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            pair: default_pair(),
            ws_url: None,
            log_path: None,
            buffer_size: None,
        }
    }
}

impl FeedConfig {
    pub fn options(&self) -> FeedOptions {
        FeedOptions {
            url: self.ws_url.clone(),
            log_path: self.log_path.clone(),
            buffer_size: self.buffer_size,
            ..Default::default()
        }
    }
}

/// Sell policy and fee configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Simulated fee rate per trade leg
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Width of the sell-min band above breakeven
    #[serde(default = "default_sell_min")]
    pub sell_min: Decimal,

    /// Ticks used for the trend regression
    #[serde(default = "default_emergency_sell_sample")]
    pub emergency_sell_sample: usize,

    /// Smallest order size the bot will place
    #[serde(default = "default_minimum_order_size")]
    pub minimum_order_size: Decimal,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(5, 3) // 0.005 = 0.5%
}
fn default_sell_min() -> Decimal {
    Decimal::new(2, 3) // 0.002 = 0.2%
}
fn default_emergency_sell_sample() -> usize {
    10
}
fn default_minimum_order_size() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            sell_min: default_sell_min(),
            emergency_sell_sample: default_emergency_sell_sample(),
            minimum_order_size: default_minimum_order_size(),
        }
    }
}

impl TradingConfig {
    pub fn profit_config(&self) -> ProfitConfig {
        ProfitConfig {
            sell_min: self.sell_min,
            emergency_sell_sample: self.emergency_sell_sample,
        }
    }
}

/// Paper ledger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// Starting balances by currency
    #[serde(default)]
    pub balances: BTreeMap<String, Decimal>,
}

fn default_quote_currency() -> String {
    DEFAULT_QUOTE_CURRENCY.to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            quote_currency: default_quote_currency(),
            balances: BTreeMap::new(),
        }
    }
}

impl LedgerConfig {
    /// Build a ledger holding the starting balances
    pub fn build(&self, fee_rate: Decimal) -> LocalLedger {
        self.balances.iter().fold(
            LocalLedger::new(self.quote_currency.clone(), fee_rate),
            |ledger, (currency, amount)| ledger.with_balance(currency, *amount),
        )
    }
}

/// Execution configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Execution mode
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Trades are simulated on the local ledger only
    #[default]
    Local,
    /// Trades go through the simulated exchange gateway
    Paper,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the trading logic cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let trading = &self.trading;

        if self.feed.pair.is_empty() {
            anyhow::bail!("feed.pair must not be empty");
        }
        if trading.fee_rate < Decimal::ZERO || trading.fee_rate >= Decimal::ONE {
            anyhow::bail!("trading.fee_rate must be in [0, 1), got {}", trading.fee_rate);
        }
        if trading.sell_min < Decimal::ZERO || trading.sell_min >= Decimal::ONE {
            anyhow::bail!("trading.sell_min must be in [0, 1), got {}", trading.sell_min);
        }
        if trading.emergency_sell_sample < 2 {
            anyhow::bail!(
                "trading.emergency_sell_sample must be at least 2, got {}",
                trading.emergency_sell_sample
            );
        }
        if self.feed.buffer_size == Some(0) {
            anyhow::bail!("feed.buffer_size must be positive");
        }

        Ok(())
    }
}
