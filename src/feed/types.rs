//! Price feed types

use super::Exchange;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single ticker update from an exchange stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Trading pair (e.g., "BTC-USD")
    pub pair: String,
    /// Exchange timestamp as received (ISO-8601)
    pub exchange_time: String,
    /// Local wall-clock time when the tick was received
    pub timestamp: DateTime<Utc>,
    /// Last trade price
    pub price: Decimal,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub open_24h: Decimal,
    pub volume_24h: Decimal,
    pub low_24h: Decimal,
    pub high_24h: Decimal,
    pub volume_30d: Decimal,
    /// Size of the last trade
    pub last_size: Decimal,
}

impl Tick {
    /// Create a tick carrying only a price, stamped at `exchange_time`
    pub fn at_price(pair: impl Into<String>, price: Decimal, exchange_time: DateTime<Utc>) -> Self {
        Self {
            pair: pair.into(),
            exchange_time: exchange_time.to_rfc3339_opts(SecondsFormat::Micros, true),
            timestamp: Utc::now(),
            price,
            best_bid: Decimal::ZERO,
            best_ask: Decimal::ZERO,
            open_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            low_24h: Decimal::ZERO,
            high_24h: Decimal::ZERO,
            volume_30d: Decimal::ZERO,
            last_size: Decimal::ZERO,
        }
    }

    /// Exchange time as fractional seconds since the Unix epoch
    pub fn epoch_seconds(&self) -> Result<f64, FeedError> {
        epoch_from_iso8601(&self.exchange_time)
    }
}

/// Convert an ISO-8601 / RFC 3339 timestamp to epoch seconds
pub fn epoch_from_iso8601(value: &str) -> Result<f64, FeedError> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| FeedError::Decode(format!("bad timestamp {value:?}: {e}")))?;
    Ok(parsed.timestamp_micros() as f64 / 1_000_000.0)
}

/// Handle returned when registering a price observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Price feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport could not be established or failed while reading
    #[error("Connection error: {0}")]
    Connection(String),
    /// A frame could not be decoded into a tick
    #[error("Decode error: {0}")]
    Decode(String),
    /// The exchange answered the subscription with an error
    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),
    /// No feed registered for this exchange and pair
    #[error("No {exchange} feed for {pair}")]
    UnknownFeed { exchange: Exchange, pair: String },
    /// The CSV tick log could not be written
    #[error("Tick log error: {0}")]
    Log(String),
}
