//! Execution module
//!
//! Order types, the exchange gateway seam, a simulated gateway and the
//! paper trading ledger

mod ledger;
mod paper;
mod types;

pub use ledger::{LocalLedger, DEFAULT_QUOTE_CURRENCY};
pub use paper::PaperGateway;
pub use types::{
    base_currency, Account, Fees, Fill, OrderAck, OrderRequest, OrderStatus, OrderType, Side,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Authenticated exchange access used to trade live
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Submit an order
    async fn place_order(&self, order: OrderRequest) -> anyhow::Result<OrderAck>;
    /// Cancel a resting order
    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()>;
    /// Orders still resting on the book
    async fn get_open_orders(&self) -> anyhow::Result<Vec<OrderAck>>;
    /// Balances held at the exchange
    async fn get_accounts(&self) -> anyhow::Result<Vec<Account>>;
    /// Last trade price of a pair
    async fn get_price(&self, pair: &str) -> anyhow::Result<Decimal>;
    /// Current fee schedule
    async fn get_fees(&self) -> anyhow::Result<Fees>;
}
