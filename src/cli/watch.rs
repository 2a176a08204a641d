//! Watch command implementation

use crate::config::Config;
use crate::feed::{Exchange, PriceFeed};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Pair to stream; the configured pair when omitted
    pub pair: Option<String>,

    /// Exchange to stream from
    #[arg(short, long)]
    pub exchange: Option<Exchange>,

    /// Append every tick to this CSV file
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

impl WatchArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let pair = self.pair.as_deref().unwrap_or(&config.feed.pair);
        let exchange = self.exchange.unwrap_or(config.feed.exchange);

        let mut options = config.feed.options();
        if self.log.is_some() {
            options.log_path = self.log.clone();
        }

        let feed = PriceFeed::open(pair, exchange, options).await?;
        if let Some(ack) = feed.get_response().await {
            tracing::debug!(%ack, "Subscription acknowledged");
        }

        let mut ticks = feed.subscribe_ticks();
        let mut printed = 0usize;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                tick = ticks.recv() => match tick {
                    Ok(tick) => {
                        println!(
                            "{} {} {} bid {} ask {}",
                            tick.exchange_time, tick.pair, tick.price, tick.best_bid, tick.best_ask
                        );
                        printed += 1;
                        if self.count.is_some_and(|n| printed >= n) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Output fell behind the feed");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        feed.close();
        Ok(())
    }
}
