//! Tick logging subscriber

use crate::feed::{PriceObserver, Tick};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logs every tick it sees and counts them
#[derive(Debug, Default)]
pub struct TickReporter {
    seen: AtomicU64,
}

impl TickReporter {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PriceObserver for TickReporter {
    async fn on_price(&self, tick: &Tick) -> anyhow::Result<()> {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            pair = %tick.pair,
            price = %tick.price,
            time = %tick.exchange_time,
            n,
            "Tick"
        );
        Ok(())
    }
}
