//! Simulated exchange gateway

use super::{
    base_currency, Account, ExchangeGateway, Fees, Fill, LocalLedger, OrderAck, OrderRequest,
    OrderStatus, Side,
};
use crate::feed::{PriceFeed, PriceObserver, Tick};
use crate::risk::TradeError;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Paper exchange with simulated fills
///
/// Market orders fill immediately at the last price seen for the pair. Limit
/// orders rest until canceled or until a tick crosses their price. Balances
/// live in the gateway's own account, separate from any local ledger.
/// Register it as a [`PriceObserver`] on a feed to keep its prices current.
pub struct PaperGateway {
    fees: Fees,
    account: LocalLedger,
    prices: RwLock<HashMap<String, Decimal>>,
    open_orders: RwLock<Vec<OrderAck>>,
    fills: RwLock<Vec<Fill>>,
}

impl PaperGateway {
    /// Create a paper gateway charging `fee_rate` on every fill
    pub fn new(quote_currency: &str, fee_rate: Decimal) -> Self {
        Self {
            fees: Fees {
                maker_fee_rate: fee_rate,
                taker_fee_rate: fee_rate,
            },
            account: LocalLedger::new(quote_currency, fee_rate),
            prices: RwLock::new(HashMap::new()),
            open_orders: RwLock::new(vec![]),
            fills: RwLock::new(vec![]),
        }
    }

    /// Fund the exchange-side account
    pub fn with_balance(self, currency: &str, amount: Decimal) -> Self {
        self.account.credit(currency, amount);
        self
    }

    /// Exchange-side balances
    pub fn account(&self) -> &LocalLedger {
        &self.account
    }

    /// Override the last price of a pair
    pub async fn set_price(&self, pair: &str, price: Decimal) {
        self.prices.write().await.insert(pair.to_string(), price);
    }

    /// Take the feed's most recent price, if it has one
    pub async fn sync_price(&self, feed: &PriceFeed) {
        if let Some(tick) = feed.get_most_recent_tick().await {
            self.set_price(&tick.pair, tick.price).await;
        }
    }

    /// Every fill so far
    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }

    async fn fill(&self, order_id: &str, order: &OrderRequest, price: Decimal) -> Result<(), TradeError> {
        self.account
            .apply_trade_at(order.side, base_currency(&order.pair), order.size, price)?;

        let fill = Fill {
            order_id: order_id.to_string(),
            pair: order.pair.clone(),
            side: order.side,
            price,
            size: order.size,
            timestamp: Utc::now(),
            fees: price * order.size * self.fees.taker_fee_rate,
        };

        tracing::info!(order_id, pair = %order.pair, side = %order.side, %price, size = %order.size, "Paper order filled");
        self.fills.write().await.push(fill);
        Ok(())
    }

    fn crosses(side: Side, limit: Decimal, price: Decimal) -> bool {
        match side {
            Side::Buy => price <= limit,
            Side::Sell => price >= limit,
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn place_order(&self, order: OrderRequest) -> anyhow::Result<OrderAck> {
        let id = Uuid::new_v4().to_string();
        let mut ack = OrderAck {
            id: id.clone(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            pair: order.pair.clone(),
            side: order.side,
            size: order.size,
            price: order.price,
            reject_reason: None,
        };

        if order.size <= Decimal::ZERO {
            ack.status = OrderStatus::Rejected;
            ack.reject_reason = Some(format!("invalid size {}", order.size));
            return Ok(ack);
        }

        if order.price.is_some() {
            ack.status = OrderStatus::Open;
            self.open_orders.write().await.push(ack.clone());
            tracing::info!(order_id = %id, pair = %order.pair, "Paper limit order resting");
            return Ok(ack);
        }

        let price = self
            .prices
            .read()
            .await
            .get(&order.pair)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("No price for {}", order.pair))?;

        match self.fill(&id, &order, price).await {
            Ok(()) => {
                ack.status = OrderStatus::Done;
                ack.price = Some(price);
            }
            Err(e) => {
                tracing::warn!(order_id = %id, error = %e, "Paper order rejected");
                ack.status = OrderStatus::Rejected;
                ack.reject_reason = Some(e.to_string());
            }
        }

        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()> {
        let mut open_orders = self.open_orders.write().await;
        let index = open_orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| anyhow::anyhow!("Order {} is not open", order_id))?;
        open_orders.remove(index);

        tracing::info!(order_id, "Paper order cancelled");
        Ok(())
    }

    async fn get_open_orders(&self) -> anyhow::Result<Vec<OrderAck>> {
        Ok(self.open_orders.read().await.clone())
    }

    async fn get_accounts(&self) -> anyhow::Result<Vec<Account>> {
        Ok(self
            .account
            .balances()
            .into_iter()
            .map(|(currency, balance)| Account { currency, balance })
            .collect())
    }

    async fn get_price(&self, pair: &str) -> anyhow::Result<Decimal> {
        self.prices
            .read()
            .await
            .get(pair)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("No price for {}", pair))
    }

    async fn get_fees(&self) -> anyhow::Result<Fees> {
        Ok(self.fees)
    }
}

#[async_trait]
impl PriceObserver for PaperGateway {
    async fn on_price(&self, tick: &Tick) -> anyhow::Result<()> {
        self.set_price(&tick.pair, tick.price).await;

        let crossed: Vec<OrderAck> = {
            let mut open_orders = self.open_orders.write().await;
            let (crossed, resting): (Vec<_>, Vec<_>) = open_orders.drain(..).partition(|o| {
                o.pair == tick.pair
                    && o.price
                        .is_some_and(|limit| Self::crosses(o.side, limit, tick.price))
            });
            *open_orders = resting;
            crossed
        };

        for ack in crossed {
            let limit = ack.price.unwrap_or(tick.price);
            let order = OrderRequest::limit(ack.pair.clone(), ack.side, ack.size, limit);
            if let Err(e) = self.fill(&ack.id, &order, limit).await {
                tracing::warn!(order_id = %ack.id, error = %e, "Dropping unfillable limit order");
            }
        }

        Ok(())
    }
}
