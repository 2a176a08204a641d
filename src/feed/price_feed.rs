//! Streaming price feed for one trading pair

use super::{Exchange, FeedError, PriceObserver, SubscriptionId, Tick};
use crate::data::TickLogger;
use crate::telemetry::{increment, CounterMetric};
use crate::ws::{WsClient, WsConfig, WsMessage};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

/// Capacity of the tick broadcast channel
const BROADCAST_CAPACITY: usize = 1024;

/// Options for opening a feed
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    /// Websocket endpoint; the exchange default when unset
    pub url: Option<String>,
    /// CSV file receiving every tick
    pub log_path: Option<PathBuf>,
    /// Keep at most this many ticks in memory
    pub buffer_size: Option<usize>,
    /// Keepalive ping interval; the transport default when unset
    pub ping_interval: Option<Duration>,
}

impl FeedOptions {
    /// Set the websocket endpoint
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Log every tick to a CSV file
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Bound the in-memory history
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

/// Parallel tick and time series, always the same length
#[derive(Debug, Default)]
struct TickHistory {
    ticks: VecDeque<Tick>,
    times: VecDeque<f64>,
    capacity: Option<usize>,
}

impl TickHistory {
    fn push(&mut self, tick: Tick, time: f64) {
        if let Some(capacity) = self.capacity {
            while self.ticks.len() >= capacity {
                self.ticks.pop_front();
                self.times.pop_front();
            }
        }
        self.ticks.push_back(tick);
        self.times.push_back(time);
    }
}

/// Where frames come from
#[derive(Debug, Clone)]
enum Source {
    Remote(String),
    Channel,
}

struct Subscriber {
    id: SubscriptionId,
    observer: Weak<dyn PriceObserver>,
}

/// Live ticker feed for a single pair on one exchange
///
/// A background reader task is the only writer of the tick history. For each
/// decoded tick it appends the tick and its epoch time together, awaits
/// [`PriceObserver::on_price`] on every live subscriber in registration order
/// and then publishes the tick on a broadcast channel. A slow subscriber
/// therefore delays ingestion of the next tick.
///
/// Subscribers are held weakly; dropping the last strong reference to an
/// observer unsubscribes it.
pub struct PriceFeed {
    pair: String,
    exchange: Exchange,
    source: Source,
    log_path: Option<PathBuf>,
    ping_interval: Option<Duration>,
    history: RwLock<TickHistory>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscription: AtomicU64,
    response: RwLock<Option<String>>,
    open: AtomicBool,
    generation: AtomicU64,
    shutdown: watch::Sender<bool>,
    ticks_tx: broadcast::Sender<Tick>,
}

impl PriceFeed {
    fn new(pair: &str, exchange: Exchange, source: Source, options: &FeedOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (ticks_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            pair: pair.to_string(),
            exchange,
            source,
            log_path: options.log_path.clone(),
            ping_interval: options.ping_interval,
            history: RwLock::new(TickHistory {
                capacity: options.buffer_size.filter(|size| *size > 0),
                ..Default::default()
            }),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            response: RwLock::new(None),
            open: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown,
            ticks_tx,
        }
    }

    /// Connect to the exchange and subscribe to the pair's ticker stream
    ///
    /// Fails with [`FeedError::Connection`] when the transport cannot be
    /// established and [`FeedError::SubscriptionRejected`] when the exchange
    /// answers the subscription with an error.
    pub async fn open(
        pair: &str,
        exchange: Exchange,
        options: FeedOptions,
    ) -> Result<Arc<Self>, FeedError> {
        let url = options
            .url
            .clone()
            .unwrap_or_else(|| exchange.default_ws_url().to_string());
        let feed = Arc::new(Self::new(pair, exchange, Source::Remote(url), &options));
        feed.start().await?;
        Ok(feed)
    }

    /// Build a feed that reads frames from a channel instead of a socket
    ///
    /// Frames are decoded with the exchange's rules, exactly as if they had
    /// arrived over the wire. Must be called from within a Tokio runtime.
    pub fn from_source(
        pair: &str,
        exchange: Exchange,
        options: FeedOptions,
        frames: mpsc::Receiver<WsMessage>,
    ) -> Result<Arc<Self>, FeedError> {
        let feed = Arc::new(Self::new(pair, exchange, Source::Channel, &options));
        let logger = feed.open_logger()?;
        feed.spawn_reader(frames, logger);
        Ok(feed)
    }

    /// Reopen a closed feed, continuing the same history
    pub async fn restart(self: &Arc<Self>) -> Result<(), FeedError> {
        if self.is_websocket_open() {
            tracing::info!(pair = %self.pair, "Feed already running");
            return Ok(());
        }
        self.start().await
    }

    async fn start(self: &Arc<Self>) -> Result<(), FeedError> {
        let Source::Remote(url) = &self.source else {
            return Err(FeedError::Connection(
                "feed has no remote transport to reopen".into(),
            ));
        };

        let logger = self.open_logger()?;

        let mut config = WsConfig::new(url.clone());
        if let Some(interval) = self.ping_interval {
            config = config.ping_interval(interval);
        }

        self.shutdown.send_replace(false);
        let connection = WsClient::new(config)
            .connect(
                &self.exchange.subscribe_frame(&self.pair),
                self.shutdown.subscribe(),
            )
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;

        *self.response.write().await = Some(connection.ack.clone());

        if let Err(e) = self.exchange.validate_ack(&connection.ack) {
            tracing::error!(pair = %self.pair, exchange = %self.exchange, error = %e, "Subscription failed");
            self.shutdown.send_replace(true);
            return Err(e);
        }

        self.spawn_reader(connection.rx, logger);

        tracing::info!(pair = %self.pair, exchange = %self.exchange, "Feed opened");
        Ok(())
    }

    fn open_logger(&self) -> Result<Option<TickLogger>, FeedError> {
        self.log_path.as_ref().map(TickLogger::open).transpose()
    }

    fn spawn_reader(self: &Arc<Self>, frames: mpsc::Receiver<WsMessage>, logger: Option<TickLogger>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.store(true, Ordering::SeqCst);

        let feed = Arc::clone(self);
        tokio::spawn(async move {
            feed.run_reader(frames, logger, generation).await;
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.open.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Reader loop: runs until closed, disconnected or a subscriber fails
    async fn run_reader(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<WsMessage>,
        mut logger: Option<TickLogger>,
        generation: u64,
    ) {
        let mut shutdown = self.shutdown.subscribe();

        while self.is_current(generation) {
            tokio::select! {
                msg = frames.recv() => match msg {
                    Some(msg) => {
                        if !self.handle_frame(msg, logger.as_mut(), generation).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => {}
            }
        }

        // Only the live reader may mark the feed closed
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.open.store(false, Ordering::SeqCst);
            self.shutdown.send_replace(true);
        }

        if let Some(logger) = logger.as_mut() {
            if let Err(e) = logger.flush() {
                tracing::warn!(pair = %self.pair, error = %e, "Failed to flush tick log");
            }
        }

        tracing::info!(pair = %self.pair, exchange = %self.exchange, "Feed reader stopped");
    }

    /// Returns false when the reader should stop
    async fn handle_frame(
        &self,
        msg: WsMessage,
        logger: Option<&mut TickLogger>,
        generation: u64,
    ) -> bool {
        // Frames that arrive after close are dropped
        if !self.is_current(generation) {
            return false;
        }

        match msg {
            WsMessage::Text(text) => match self.decode(&text) {
                Ok(Some((tick, time))) => match self.process(tick, time, logger).await {
                    Ok(()) => true,
                    Err(e) => {
                        increment(CounterMetric::SubscriberFailures, &self.pair);
                        tracing::error!(
                            pair = %self.pair,
                            error = %e,
                            "Subscriber failed, closing feed"
                        );
                        false
                    }
                },
                Ok(None) => true,
                Err(e) => {
                    increment(CounterMetric::DecodeErrors, &self.pair);
                    tracing::warn!(pair = %self.pair, error = %e, "Skipping undecodable frame");
                    true
                }
            },
            WsMessage::Binary(_) => true,
            WsMessage::Closed => {
                tracing::warn!(pair = %self.pair, exchange = %self.exchange, "Feed transport closed");
                false
            }
        }
    }

    fn decode(&self, text: &str) -> Result<Option<(Tick, f64)>, FeedError> {
        let Some(tick) = self.exchange.parse_tick(&self.pair, text)? else {
            return Ok(None);
        };
        let time = tick.epoch_seconds()?;
        Ok(Some((tick, time)))
    }

    async fn process(
        &self,
        tick: Tick,
        time: f64,
        logger: Option<&mut TickLogger>,
    ) -> anyhow::Result<()> {
        if let Some(logger) = logger {
            if let Err(e) = logger.log(&tick) {
                tracing::warn!(pair = %self.pair, error = %e, "Failed to log tick");
            }
        }

        self.history.write().await.push(tick.clone(), time);
        increment(CounterMetric::TicksReceived, &self.pair);
        tracing::trace!(pair = %self.pair, price = %tick.price, "Tick");

        for observer in self.live_observers().await {
            observer.on_price(&tick).await?;
        }

        // No receivers is fine
        let _ = self.ticks_tx.send(tick);
        Ok(())
    }

    async fn live_observers(&self) -> Vec<Arc<dyn PriceObserver>> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| s.observer.strong_count() > 0);
        subscribers
            .iter()
            .filter_map(|s| s.observer.upgrade())
            .collect()
    }

    /// Stop the feed; idempotent
    ///
    /// The reader notices on its next wakeup, so one in-flight tick may still
    /// be delivered to subscribers.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.shutdown.send_replace(true);
            tracing::info!(pair = %self.pair, exchange = %self.exchange, "Closed feed");
        } else {
            tracing::debug!(pair = %self.pair, "Feed already closed");
        }
    }

    /// Register a subscriber for price events
    ///
    /// Only a weak reference is kept. Registering the same observer twice
    /// delivers each tick to it twice.
    pub async fn append_callback<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: PriceObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn PriceObserver> = weak;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().await.push(Subscriber { id, observer: weak });
        tracing::debug!(pair = %self.pair, subscription = id.0, "Subscriber added");
        id
    }

    /// Unregister a subscriber; returns whether it was registered
    pub async fn remove_callback(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Receive every tick on a channel, after subscribers have seen it
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<Tick> {
        self.ticks_tx.subscribe()
    }

    /// Latest tick, if any has arrived
    pub async fn get_most_recent_tick(&self) -> Option<Tick> {
        self.history.read().await.ticks.back().cloned()
    }

    /// Epoch time of the latest tick
    pub async fn get_most_recent_time(&self) -> Option<f64> {
        self.history.read().await.times.back().copied()
    }

    /// Tick history, oldest first; parallel with [`Self::get_time_feed`]
    pub async fn get_ticker_feed(&self) -> Vec<Tick> {
        self.history.read().await.ticks.iter().cloned().collect()
    }

    /// Epoch-seconds history, oldest first
    pub async fn get_time_feed(&self) -> Vec<f64> {
        self.history.read().await.times.iter().copied().collect()
    }

    /// Both series read under one lock
    pub async fn snapshot(&self) -> (Vec<Tick>, Vec<f64>) {
        let history = self.history.read().await;
        (
            history.ticks.iter().cloned().collect(),
            history.times.iter().copied().collect(),
        )
    }

    /// The last `n` (epoch time, price) points, oldest first
    pub async fn recent_prices(&self, n: usize) -> Vec<(f64, Decimal)> {
        let history = self.history.read().await;
        let skip = history.ticks.len().saturating_sub(n);
        history
            .times
            .iter()
            .zip(history.ticks.iter())
            .skip(skip)
            .map(|(time, tick)| (*time, tick.price))
            .collect()
    }

    /// Number of ticks held
    pub async fn len(&self) -> usize {
        self.history.read().await.ticks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The server's reply to the subscription request
    pub async fn get_response(&self) -> Option<String> {
        self.response.read().await.clone()
    }

    pub fn is_websocket_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn pair_id(&self) -> &str {
        &self.pair
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }
}

impl std::fmt::Debug for PriceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeed")
            .field("pair", &self.pair)
            .field("exchange", &self.exchange)
            .field("source", &self.source)
            .field("open", &self.is_websocket_open())
            .finish()
    }
}
