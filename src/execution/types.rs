//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that closes a position opened on this side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Base currency of a pair id ("BTC" for "BTC-USD")
pub fn base_currency(pair: &str) -> &str {
    pair.split(['-', '/']).next().unwrap_or(pair)
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price specified)
    Limit,
}

/// An order intent submitted to a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading pair (e.g., "BTC-USD")
    pub pair: String,
    pub side: Side,
    /// Size in base currency units
    pub size: Decimal,
    /// Limit price; market order when absent
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(pair: impl Into<String>, side: Side, size: Decimal) -> Self {
        Self {
            pair: pair.into(),
            side,
            size,
            price: None,
        }
    }

    pub fn limit(pair: impl Into<String>, side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            pair: pair.into(),
            side,
            size,
            price: Some(price),
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self.price {
            Some(_) => OrderType::Limit,
            None => OrderType::Market,
        }
    }
}

/// Order status as reported by a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    /// Resting on the book
    Open,
    /// Fully filled
    Done,
    Rejected,
}

/// Gateway reply to an order placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange-assigned order id
    pub id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub pair: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Option<Decimal>,
    /// Why the order was rejected, if it was
    pub reject_reason: Option<String>,
}

impl OrderAck {
    pub fn is_rejected(&self) -> bool {
        self.status == OrderStatus::Rejected
    }
}

/// Fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fees {
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
}

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Fees paid in quote currency
    pub fees: Decimal,
}

/// Balance of one currency held at a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub currency: String,
    pub balance: Decimal,
}
