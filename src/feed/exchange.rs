//! Exchange-specific stream handling
//!
//! Each supported exchange knows its websocket endpoint, how to phrase a
//! ticker subscription, how to read the acknowledgment and how to decode its
//! frames into [`Tick`]s. Everything else about a feed is shared.

use super::{FeedError, Tick};
use chrono::{SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Coinbase Pro websocket feed
const COINBASE_PRO_WS_URL: &str = "wss://ws-feed.pro.coinbase.com";

/// Binance websocket base URL
const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Supported streaming exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    CoinbasePro,
    Binance,
}

/// Coinbase Pro ticker channel frame
#[derive(Debug, Deserialize)]
struct CoinbaseFrame {
    #[serde(rename = "type")]
    msg_type: String,
    product_id: Option<String>,
    time: Option<String>,
    price: Option<String>,
    open_24h: Option<String>,
    volume_24h: Option<String>,
    low_24h: Option<String>,
    high_24h: Option<String>,
    volume_30d: Option<String>,
    best_bid: Option<String>,
    best_ask: Option<String>,
    last_size: Option<String>,
    message: Option<String>,
    reason: Option<String>,
}

/// Binance trade message structure
#[derive(Debug, Deserialize)]
struct BinanceTradeMessage {
    /// Event type
    #[serde(rename = "e")]
    event_type: String,
    /// Symbol
    #[serde(rename = "s")]
    symbol: String,
    /// Price
    #[serde(rename = "p")]
    price: String,
    /// Quantity
    #[serde(rename = "q")]
    quantity: String,
    /// Trade time (milliseconds)
    #[serde(rename = "T")]
    trade_time: i64,
}

impl Exchange {
    /// Configuration name of the exchange
    pub fn name(&self) -> &'static str {
        match self {
            Exchange::CoinbasePro => "coinbase_pro",
            Exchange::Binance => "binance",
        }
    }

    /// Default websocket endpoint
    pub fn default_ws_url(&self) -> &'static str {
        match self {
            Exchange::CoinbasePro => COINBASE_PRO_WS_URL,
            Exchange::Binance => BINANCE_WS_URL,
        }
    }

    /// Pair id as the exchange spells it on the wire
    pub fn stream_symbol(&self, pair: &str) -> String {
        match self {
            Exchange::CoinbasePro => pair.to_uppercase(),
            Exchange::Binance => pair.replace('-', "").to_lowercase(),
        }
    }

    /// Subscription request for the ticker stream of `pair`
    pub fn subscribe_frame(&self, pair: &str) -> String {
        let symbol = self.stream_symbol(pair);
        let frame = match self {
            Exchange::CoinbasePro => json!({
                "type": "subscribe",
                "product_ids": [symbol],
                "channels": [{ "name": "ticker", "product_ids": [symbol] }],
            }),
            Exchange::Binance => json!({
                "method": "SUBSCRIBE",
                "params": [format!("{}@trade", symbol)],
                "id": 1,
            }),
        };
        frame.to_string()
    }

    /// Check the server's reply to the subscription request
    pub fn validate_ack(&self, ack: &str) -> Result<(), FeedError> {
        let value: Value = serde_json::from_str(ack)
            .map_err(|e| FeedError::SubscriptionRejected(format!("unreadable ack: {e}")))?;

        match self {
            Exchange::CoinbasePro => {
                if value.get("type").and_then(Value::as_str) == Some("error") {
                    let message = value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    let reason = value.get("reason").and_then(Value::as_str);
                    return Err(FeedError::SubscriptionRejected(match reason {
                        Some(reason) => format!("{message}: {reason}"),
                        None => message.to_string(),
                    }));
                }
            }
            Exchange::Binance => {
                if let Some(error) = value.get("error") {
                    let message = error
                        .get("msg")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    return Err(FeedError::SubscriptionRejected(message));
                }
            }
        }

        Ok(())
    }

    /// Decode a frame
    ///
    /// Returns `Ok(None)` for frames that are well formed but carry no tick
    /// (heartbeats, late acknowledgments, other channels).
    pub fn parse_tick(&self, pair: &str, text: &str) -> Result<Option<Tick>, FeedError> {
        match self {
            Exchange::CoinbasePro => Self::parse_coinbase(pair, text),
            Exchange::Binance => Self::parse_binance(pair, text),
        }
    }

    fn parse_coinbase(pair: &str, text: &str) -> Result<Option<Tick>, FeedError> {
        let frame: CoinbaseFrame =
            serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;

        match frame.msg_type.as_str() {
            "ticker" => {}
            "error" => {
                return Err(FeedError::Decode(format!(
                    "error frame: {}",
                    frame.message.or(frame.reason).unwrap_or_default()
                )))
            }
            _ => return Ok(None),
        }

        let price = frame
            .price
            .as_deref()
            .ok_or_else(|| FeedError::Decode("ticker frame without price".into()))
            .and_then(|p| decimal("price", p))?;

        let timestamp = Utc::now();
        let exchange_time = frame
            .time
            .unwrap_or_else(|| timestamp.to_rfc3339_opts(SecondsFormat::Micros, true));

        Ok(Some(Tick {
            pair: frame.product_id.unwrap_or_else(|| pair.to_string()),
            exchange_time,
            timestamp,
            price,
            best_bid: optional_decimal("best_bid", frame.best_bid.as_deref())?,
            best_ask: optional_decimal("best_ask", frame.best_ask.as_deref())?,
            open_24h: optional_decimal("open_24h", frame.open_24h.as_deref())?,
            volume_24h: optional_decimal("volume_24h", frame.volume_24h.as_deref())?,
            low_24h: optional_decimal("low_24h", frame.low_24h.as_deref())?,
            high_24h: optional_decimal("high_24h", frame.high_24h.as_deref())?,
            volume_30d: optional_decimal("volume_30d", frame.volume_30d.as_deref())?,
            last_size: optional_decimal("last_size", frame.last_size.as_deref())?,
        }))
    }

    fn parse_binance(pair: &str, text: &str) -> Result<Option<Tick>, FeedError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;

        // Subscription results can trail the acknowledgment
        if value.get("result").is_some() {
            return Ok(None);
        }

        let trade: BinanceTradeMessage =
            serde_json::from_value(value).map_err(|e| FeedError::Decode(e.to_string()))?;

        if trade.event_type != "trade" {
            return Ok(None);
        }

        let price = decimal("price", &trade.price)?;
        let last_size = decimal("quantity", &trade.quantity)?;
        let exchange_ts = Utc
            .timestamp_millis_opt(trade.trade_time)
            .single()
            .ok_or_else(|| FeedError::Decode(format!("bad trade time {}", trade.trade_time)))?;

        tracing::trace!(symbol = %trade.symbol, %price, "Binance trade");

        let mut tick = Tick::at_price(pair, price, exchange_ts);
        tick.last_size = last_size;
        Ok(Some(tick))
    }
}

fn decimal(field: &str, value: &str) -> Result<Decimal, FeedError> {
    Decimal::from_str(value).map_err(|e| FeedError::Decode(format!("{field}: {e}")))
}

fn optional_decimal(field: &str, value: Option<&str>) -> Result<Decimal, FeedError> {
    value.map_or(Ok(Decimal::ZERO), |v| decimal(field, v))
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coinbase_pro" | "coinbase-pro" | "coinbase" => Ok(Exchange::CoinbasePro),
            "binance" => Ok(Exchange::Binance),
            other => Err(format!("unsupported exchange: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const COINBASE_TICKER: &str = r#"{
        "type": "ticker",
        "sequence": 24561822135,
        "product_id": "BTC-USD",
        "price": "57000.12",
        "open_24h": "56000.00",
        "volume_24h": "15000.5",
        "low_24h": "55500.01",
        "high_24h": "58000.99",
        "volume_30d": "450000.1",
        "best_bid": "57000.11",
        "best_ask": "57000.13",
        "side": "buy",
        "time": "2021-05-01T12:00:00.123456Z",
        "trade_id": 160775277,
        "last_size": "0.0015"
    }"#;

    #[test]
    fn test_exchange_names() {
        assert_eq!(Exchange::CoinbasePro.to_string(), "coinbase_pro");
        assert_eq!(Exchange::Binance.to_string(), "binance");
        assert_eq!("Coinbase".parse::<Exchange>().unwrap(), Exchange::CoinbasePro);
        assert_eq!("binance".parse::<Exchange>().unwrap(), Exchange::Binance);
        assert!("kraken".parse::<Exchange>().is_err());
    }

    #[test]
    fn test_stream_symbol() {
        assert_eq!(Exchange::CoinbasePro.stream_symbol("btc-usd"), "BTC-USD");
        assert_eq!(Exchange::Binance.stream_symbol("BTC-USDT"), "btcusdt");
    }

    #[test]
    fn test_coinbase_subscribe_frame() {
        let frame: Value =
            serde_json::from_str(&Exchange::CoinbasePro.subscribe_frame("BTC-USD")).unwrap();

        assert_eq!(frame["type"], "subscribe");
        assert_eq!(frame["product_ids"], json!(["BTC-USD"]));
        assert_eq!(frame["channels"][0]["name"], "ticker");
        assert_eq!(frame["channels"][0]["product_ids"], json!(["BTC-USD"]));
    }

    #[test]
    fn test_binance_subscribe_frame() {
        let frame: Value =
            serde_json::from_str(&Exchange::Binance.subscribe_frame("BTCUSDT")).unwrap();

        assert_eq!(frame["method"], "SUBSCRIBE");
        assert_eq!(frame["params"], json!(["btcusdt@trade"]));
        assert_eq!(frame["id"], 1);
    }

    #[test]
    fn test_coinbase_ack_accepted() {
        let ack = r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#;
        assert!(Exchange::CoinbasePro.validate_ack(ack).is_ok());
    }

    #[test]
    fn test_coinbase_ack_rejected() {
        let ack = r#"{"type":"error","message":"Failed to subscribe","reason":"BTC-XYZ is not a valid product"}"#;
        let err = Exchange::CoinbasePro.validate_ack(ack).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Subscription rejected: Failed to subscribe: BTC-XYZ is not a valid product"
        );
    }

    #[test]
    fn test_binance_ack() {
        assert!(Exchange::Binance
            .validate_ack(r#"{"result":null,"id":1}"#)
            .is_ok());

        let err = Exchange::Binance
            .validate_ack(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#)
            .unwrap_err();
        assert!(matches!(err, FeedError::SubscriptionRejected(ref m) if m == "Invalid request"));
    }

    #[test]
    fn test_unreadable_ack_rejected() {
        let result = Exchange::CoinbasePro.validate_ack("not json");
        assert!(matches!(result, Err(FeedError::SubscriptionRejected(_))));
    }

    #[test]
    fn test_parse_coinbase_ticker() {
        let tick = Exchange::CoinbasePro
            .parse_tick("BTC-USD", COINBASE_TICKER)
            .unwrap()
            .unwrap();

        assert_eq!(tick.pair, "BTC-USD");
        assert_eq!(tick.price, dec!(57000.12));
        assert_eq!(tick.best_bid, dec!(57000.11));
        assert_eq!(tick.best_ask, dec!(57000.13));
        assert_eq!(tick.volume_30d, dec!(450000.1));
        assert_eq!(tick.last_size, dec!(0.0015));
        assert_eq!(tick.exchange_time, "2021-05-01T12:00:00.123456Z");
    }

    #[test]
    fn test_parse_coinbase_heartbeat_skipped() {
        let frame = r#"{"type":"heartbeat","sequence":90,"last_trade_id":20,"product_id":"BTC-USD","time":"2021-05-01T12:00:00Z"}"#;
        assert!(Exchange::CoinbasePro
            .parse_tick("BTC-USD", frame)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_coinbase_missing_price() {
        let frame = r#"{"type":"ticker","product_id":"BTC-USD","time":"2021-05-01T12:00:00Z"}"#;
        let result = Exchange::CoinbasePro.parse_tick("BTC-USD", frame);
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_parse_coinbase_bad_decimal() {
        let frame = r#"{"type":"ticker","product_id":"BTC-USD","price":"abc","time":"2021-05-01T12:00:00Z"}"#;
        let result = Exchange::CoinbasePro.parse_tick("BTC-USD", frame);
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_parse_coinbase_invalid_json() {
        let result = Exchange::CoinbasePro.parse_tick("BTC-USD", "not valid json");
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_parse_binance_trade() {
        let msg = r#"{
            "e": "trade",
            "E": 1704067200000,
            "s": "BTCUSDT",
            "t": 123456789,
            "p": "42500.50",
            "q": "0.001",
            "b": 88,
            "a": 50,
            "T": 1704067200123,
            "m": true,
            "M": true
        }"#;

        let tick = Exchange::Binance.parse_tick("BTCUSDT", msg).unwrap().unwrap();
        assert_eq!(tick.pair, "BTCUSDT");
        assert_eq!(tick.price, dec!(42500.50));
        assert_eq!(tick.last_size, dec!(0.001));
        assert_eq!(tick.exchange_time, "2024-01-01T00:00:00.123000Z");
    }

    #[test]
    fn test_parse_binance_other_event_skipped() {
        let msg = r#"{"e":"aggTrade","E":1704067200000,"s":"BTCUSDT","p":"42500.50","q":"0.001","T":1704067200123}"#;
        assert!(Exchange::Binance.parse_tick("BTCUSDT", msg).unwrap().is_none());
    }

    #[test]
    fn test_parse_binance_late_result_skipped() {
        let msg = r#"{"result":null,"id":1}"#;
        assert!(Exchange::Binance.parse_tick("BTCUSDT", msg).unwrap().is_none());
    }

    #[test]
    fn test_parse_binance_invalid_price() {
        let msg = r#"{"e":"trade","E":1704067200000,"s":"BTCUSDT","p":"not_a_number","q":"0.001","T":1704067200123}"#;
        let result = Exchange::Binance.parse_tick("BTCUSDT", msg);
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }
}
