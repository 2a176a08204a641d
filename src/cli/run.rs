//! Run command implementation

use super::TickReporter;
use crate::config::{Config, ExecutionMode};
use crate::execution::{OrderRequest, PaperGateway, Side};
use crate::feed::{FeedRegistry, PriceFeed};
use crate::risk::{ProfitManager, TradeContext};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pair to trade; the configured pair when omitted
    #[arg(short, long)]
    pub pair: Option<String>,

    /// Open a market buy of this size on the first tick
    #[arg(short, long)]
    pub size: Option<Decimal>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let pair = self.pair.clone().unwrap_or_else(|| config.feed.pair.clone());
        let fee_rate = config.trading.fee_rate;
        let ledger = Arc::new(config.ledger.build(fee_rate));

        let gateway = match config.execution.mode {
            ExecutionMode::Paper => Some(Arc::new(config.ledger.balances.iter().fold(
                PaperGateway::new(&config.ledger.quote_currency, fee_rate),
                |gateway, (currency, amount)| gateway.with_balance(currency, *amount),
            ))),
            ExecutionMode::Local => None,
        };

        let mut registry = FeedRegistry::with_options(config.feed.exchange, config.feed.options());
        let reporter = Arc::new(TickReporter::default());
        let feed = registry.create_feed(&pair, &reporter, None).await?;

        let ctx = match &gateway {
            Some(gateway) => {
                feed.append_callback(gateway).await;
                TradeContext::live(Arc::clone(&ledger), gateway.clone())
            }
            None => TradeContext::paper(Arc::clone(&ledger)),
        };

        let manager = ProfitManager::new(Arc::clone(&feed), config.trading.profit_config()).await;

        tracing::info!(
            %pair,
            exchange = %feed.exchange(),
            mode = ?config.execution.mode,
            "Profit manager running"
        );

        if let Some(size) = self.size {
            if size < config.trading.minimum_order_size {
                anyhow::bail!(
                    "Order size {} is below the minimum of {}",
                    size,
                    config.trading.minimum_order_size
                );
            }

            wait_for_first_tick(&feed).await?;
            if let Some(gateway) = &gateway {
                // Ticks read before the gateway subscribed never reached it
                gateway.sync_price(&feed).await;
            }
            let position = manager
                .open_position(OrderRequest::market(pair.as_str(), Side::Buy, size), ctx)
                .await?;

            println!(
                "Bought {} {} at {} (breakeven {})",
                position.size(),
                pair,
                position.price_at_open(),
                position.get_profitable_sell_price().round_dp(8)
            );
        }

        let deadline = async {
            match self.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
            _ = deadline => tracing::info!("Run duration elapsed"),
            _ = wait_for_close(&feed) => tracing::warn!("Feed stopped"),
        }

        registry.close_all();

        println!("Ticks received: {}", reporter.seen());
        println!("Open positions: {}", manager.open_count().await);
        println!("Ledger:");
        for (currency, balance) in ledger.balances() {
            println!("  {}: {}", currency, balance);
        }

        Ok(())
    }
}

async fn wait_for_first_tick(feed: &PriceFeed) -> anyhow::Result<()> {
    let mut ticks = feed.subscribe_ticks();
    if feed.get_most_recent_tick().await.is_some() {
        return Ok(());
    }
    ticks.recv().await?;
    Ok(())
}

async fn wait_for_close(feed: &PriceFeed) {
    while feed.is_websocket_open() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
