//! Price feed module
//!
//! Streams live ticker updates per trading pair from exchange websockets,
//! keeps the tick history in memory and dispatches each tick to subscribers.

mod exchange;
mod price_feed;
mod registry;
mod rest;
mod types;

pub use exchange::Exchange;
pub use price_feed::{FeedOptions, PriceFeed};
pub use registry::FeedRegistry;
pub use rest::{SpotPriceClient, COINBASE_PRO_API_URL};
pub use types::{epoch_from_iso8601, FeedError, SubscriptionId, Tick};

use async_trait::async_trait;

/// Receives every tick of the feeds it is registered with
///
/// Runs inline in the feed's reader task: a slow observer delays the feed.
/// Returning an error stops the feed.
#[async_trait]
pub trait PriceObserver: Send + Sync {
    async fn on_price(&self, tick: &Tick) -> anyhow::Result<()>;
}
