//! Feed lookup per exchange and pair

use super::{Exchange, FeedError, FeedOptions, PriceFeed, PriceObserver, SubscriptionId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Creates and looks up [`PriceFeed`]s keyed by exchange, then pair
///
/// Mutation takes `&mut self`. Sharing a registry between tasks needs an
/// outer lock, which also serializes creation of the same key.
#[derive(Debug)]
pub struct FeedRegistry {
    default_exchange: Exchange,
    options: FeedOptions,
    log_dir: Option<PathBuf>,
    feeds: HashMap<Exchange, HashMap<String, Arc<PriceFeed>>>,
}

impl FeedRegistry {
    pub fn new(default_exchange: Exchange) -> Self {
        Self::with_options(default_exchange, FeedOptions::default())
    }

    /// Options applied to every feed this registry opens
    pub fn with_options(default_exchange: Exchange, options: FeedOptions) -> Self {
        Self {
            default_exchange,
            options,
            log_dir: None,
            feeds: HashMap::new(),
        }
    }

    /// Log each feed to `<dir>/<exchange>_<pair>.csv`
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn default_exchange(&self) -> Exchange {
        self.default_exchange
    }

    /// Open a feed for `pair` and attach `subscriber` to it
    ///
    /// An existing feed for the same exchange and pair is replaced and closed.
    pub async fn create_feed<O>(
        &mut self,
        pair: &str,
        subscriber: &Arc<O>,
        exchange: Option<Exchange>,
    ) -> Result<Arc<PriceFeed>, FeedError>
    where
        O: PriceObserver + 'static,
    {
        let exchange = exchange.unwrap_or(self.default_exchange);

        let mut options = self.options.clone();
        if let Some(dir) = &self.log_dir {
            options.log_path = Some(dir.join(format!("{}_{}.csv", exchange, pair)));
        }

        let feed = PriceFeed::open(pair, exchange, options).await?;
        feed.append_callback(subscriber).await;
        self.insert_feed(Arc::clone(&feed));

        Ok(feed)
    }

    /// Register an already built feed, returning the one it replaced
    pub fn insert_feed(&mut self, feed: Arc<PriceFeed>) -> Option<Arc<PriceFeed>> {
        let exchange = feed.exchange();
        let pair = feed.pair_id().to_string();

        let previous = self
            .feeds
            .entry(exchange)
            .or_default()
            .insert(pair.clone(), Arc::clone(&feed));

        match previous {
            Some(previous) if !Arc::ptr_eq(&previous, &feed) => {
                tracing::warn!(%pair, %exchange, "Replacing existing feed");
                previous.close();
                Some(previous)
            }
            _ => None,
        }
    }

    /// Look up the feed for `pair`
    pub fn get_feed(
        &self,
        pair: &str,
        exchange: Option<Exchange>,
    ) -> Result<Arc<PriceFeed>, FeedError> {
        let exchange = exchange.unwrap_or(self.default_exchange);
        self.feeds
            .get(&exchange)
            .and_then(|pairs| pairs.get(pair))
            .cloned()
            .ok_or_else(|| FeedError::UnknownFeed {
                exchange,
                pair: pair.to_string(),
            })
    }

    /// Attach another subscriber to an existing feed
    pub async fn append_callback<O>(
        &self,
        pair: &str,
        subscriber: &Arc<O>,
        exchange: Option<Exchange>,
    ) -> Result<SubscriptionId, FeedError>
    where
        O: PriceObserver + 'static,
    {
        let feed = self.get_feed(pair, exchange)?;
        Ok(feed.append_callback(subscriber).await)
    }

    /// Remove and close the feed for `pair`
    pub fn remove_feed(&mut self, pair: &str, exchange: Option<Exchange>) -> Option<Arc<PriceFeed>> {
        let exchange = exchange.unwrap_or(self.default_exchange);
        let feed = self.feeds.get_mut(&exchange)?.remove(pair)?;
        feed.close();
        Some(feed)
    }

    /// Close every feed and forget them
    pub fn close_all(&mut self) {
        for feed in self.feeds.values().flat_map(HashMap::values) {
            feed.close();
        }
        self.feeds.clear();
    }

    /// All registered feeds
    pub fn feeds(&self) -> impl Iterator<Item = &Arc<PriceFeed>> {
        self.feeds.values().flat_map(HashMap::values)
    }

    pub fn len(&self) -> usize {
        self.feeds.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Tick;
    use crate::ws::WsMessage;
    use async_trait::async_trait;
    use tokio::sync::{mpsc, Mutex};

    #[derive(Default)]
    struct Counter {
        seen: Mutex<usize>,
    }

    #[async_trait]
    impl PriceObserver for Counter {
        async fn on_price(&self, _tick: &Tick) -> anyhow::Result<()> {
            *self.seen.lock().await += 1;
            Ok(())
        }
    }

    fn channel_feed(pair: &str, exchange: Exchange) -> (mpsc::Sender<WsMessage>, Arc<PriceFeed>) {
        let (tx, rx) = mpsc::channel(8);
        let feed = PriceFeed::from_source(pair, exchange, FeedOptions::default(), rx).unwrap();
        (tx, feed)
    }

    #[tokio::test]
    async fn test_get_unknown_feed() {
        let registry = FeedRegistry::new(Exchange::CoinbasePro);

        let err = registry.get_feed("BTC-USD", None).unwrap_err();
        assert!(matches!(
            err,
            FeedError::UnknownFeed { exchange: Exchange::CoinbasePro, ref pair } if pair == "BTC-USD"
        ));
    }

    #[tokio::test]
    async fn test_exchange_override() {
        let mut registry = FeedRegistry::new(Exchange::CoinbasePro);
        let (_tx, feed) = channel_feed("BTCUSDT", Exchange::Binance);
        registry.insert_feed(feed);

        assert!(registry.get_feed("BTCUSDT", None).is_err());
        let found = registry.get_feed("BTCUSDT", Some(Exchange::Binance)).unwrap();
        assert_eq!(found.exchange(), Exchange::Binance);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_replacing_feed_closes_previous() {
        let mut registry = FeedRegistry::new(Exchange::CoinbasePro);
        let (_tx1, first) = channel_feed("BTC-USD", Exchange::CoinbasePro);
        let (_tx2, second) = channel_feed("BTC-USD", Exchange::CoinbasePro);

        assert!(registry.insert_feed(Arc::clone(&first)).is_none());
        // Re-inserting the same feed is not a replacement
        assert!(registry.insert_feed(Arc::clone(&first)).is_none());
        assert!(first.is_websocket_open());

        let replaced = registry.insert_feed(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(!first.is_websocket_open());
        assert!(second.is_websocket_open());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_append_callback_routes_to_feed() {
        let mut registry = FeedRegistry::new(Exchange::CoinbasePro);
        let (tx, feed) = channel_feed("BTC-USD", Exchange::CoinbasePro);
        registry.insert_feed(Arc::clone(&feed));

        let counter = Arc::new(Counter::default());
        registry
            .append_callback("BTC-USD", &counter, None)
            .await
            .unwrap();
        assert!(registry
            .append_callback("ETH-USD", &counter, None)
            .await
            .is_err());

        let mut ticks = feed.subscribe_ticks();
        tx.send(WsMessage::Text(
            r#"{"type":"ticker","product_id":"BTC-USD","price":"100","time":"2021-05-01T12:00:00Z"}"#
                .into(),
        ))
        .await
        .unwrap();
        ticks.recv().await.unwrap();

        assert_eq!(*counter.seen.lock().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_and_remove() {
        let mut registry = FeedRegistry::new(Exchange::CoinbasePro);
        let (_tx1, btc) = channel_feed("BTC-USD", Exchange::CoinbasePro);
        let (_tx2, eth) = channel_feed("ETH-USD", Exchange::CoinbasePro);
        registry.insert_feed(Arc::clone(&btc));
        registry.insert_feed(Arc::clone(&eth));

        let removed = registry.remove_feed("BTC-USD", None).unwrap();
        assert!(!removed.is_websocket_open());
        assert_eq!(registry.len(), 1);

        registry.close_all();
        assert!(!eth.is_websocket_open());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_create_feed_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut registry = FeedRegistry::with_options(
            Exchange::CoinbasePro,
            FeedOptions::default().url(format!("ws://{addr}")),
        );
        let counter = Arc::new(Counter::default());

        let result = registry.create_feed("BTC-USD", &counter, None).await;
        assert!(matches!(result, Err(FeedError::Connection(_))));
        assert!(registry.is_empty());
    }
}
