//! Position lifecycle

use super::{PositionState, TradeError};
use crate::execution::{
    base_currency, ExchangeGateway, LocalLedger, OrderRequest, OrderStatus, Side,
};
use crate::feed::{PriceFeed, Tick};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where trades are executed
///
/// Without a gateway every trade is simulated on the ledger. With one,
/// orders go to the gateway and the ledger mirrors them for bookkeeping.
#[derive(Clone)]
pub struct TradeContext {
    pub ledger: Arc<LocalLedger>,
    pub gateway: Option<Arc<dyn ExchangeGateway>>,
}

impl TradeContext {
    /// Simulated trading against the ledger alone
    pub fn paper(ledger: Arc<LocalLedger>) -> Self {
        Self {
            ledger,
            gateway: None,
        }
    }

    /// Trading through a gateway
    pub fn live(ledger: Arc<LocalLedger>, gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            ledger,
            gateway: Some(gateway),
        }
    }

    pub fn is_live(&self) -> bool {
        self.gateway.is_some()
    }
}

#[derive(Debug)]
struct Flags {
    state: PositionState,
    past_sell_min: bool,
}

/// Breakeven exit price for a position opened at `price`
///
/// Accounts for the fee on both legs: `p*(1+r)/(1-r)` for a buy and the
/// mirrored `p*(1-r)/(1+r)` for a sell. A sell position breaks even below
/// its entry price; it is not measured against the buy-side formula.
pub fn breakeven_price(side: Side, price: Decimal, fee_rate: Decimal) -> Decimal {
    let (numerator, denominator) = match side {
        Side::Buy => (Decimal::ONE + fee_rate, Decimal::ONE - fee_rate),
        Side::Sell => (Decimal::ONE - fee_rate, Decimal::ONE + fee_rate),
    };
    // A 100% fee never breaks even
    (price * numerator)
        .checked_div(denominator)
        .unwrap_or(Decimal::MAX)
}

/// One open buy or sell and its exit state
///
/// State moves from open to sold or canceled exactly once. The lock around
/// the state is held for the whole of a liquidation or cancellation, so a
/// position is never exited twice.
pub struct Position {
    id: Uuid,
    pair: String,
    side: Side,
    size: Decimal,
    limit: Option<Decimal>,
    price_at_open: Decimal,
    opened_at: String,
    order_id: Option<String>,
    fee_rate: Decimal,
    feed: Arc<PriceFeed>,
    ctx: TradeContext,
    flags: Mutex<Flags>,
}

impl Position {
    /// Open a position at the feed's most recent price
    pub async fn open(
        intent: OrderRequest,
        feed: Arc<PriceFeed>,
        ctx: TradeContext,
    ) -> Result<Self, TradeError> {
        let tick = feed
            .get_most_recent_tick()
            .await
            .ok_or_else(|| TradeError::NoPriceData(intent.pair.clone()))?;

        let base = base_currency(&intent.pair);

        let (order_id, fee_rate) = match &ctx.gateway {
            None => {
                ctx.ledger
                    .apply_trade(intent.side, base, intent.size, &tick)?;
                (None, ctx.ledger.fee_rate())
            }
            Some(gateway) => {
                let fees = gateway.get_fees().await?;
                let ack = gateway.place_order(intent.clone()).await?;
                if ack.is_rejected() {
                    return Err(TradeError::OrderRejected(
                        ack.reject_reason.unwrap_or(ack.id),
                    ));
                }
                // Resting orders reach the ledger only once they fill
                if ack.status == OrderStatus::Done {
                    mirror(&ctx.ledger, intent.side, base, intent.size, &tick);
                }
                (Some(ack.id), fees.maker_fee_rate)
            }
        };

        let position = Self {
            id: Uuid::new_v4(),
            pair: intent.pair,
            side: intent.side,
            size: intent.size,
            limit: intent.price,
            price_at_open: tick.price,
            opened_at: tick.exchange_time,
            order_id,
            fee_rate,
            feed,
            ctx,
            flags: Mutex::new(Flags {
                state: PositionState::Open,
                past_sell_min: false,
            }),
        };

        tracing::info!(
            position_id = %position.id,
            pair = %position.pair,
            side = %position.side,
            size = %position.size,
            price = %position.price_at_open,
            live = position.ctx.is_live(),
            "Position opened"
        );

        Ok(position)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn limit(&self) -> Option<Decimal> {
        self.limit
    }

    pub fn price_at_open(&self) -> Decimal {
        self.price_at_open
    }

    /// Exchange time of the tick the position opened on
    pub fn opened_at(&self) -> &str {
        &self.opened_at
    }

    /// Exchange order id; `None` for paper positions
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Breakeven exit price
    pub fn get_profitable_sell_price(&self) -> Decimal {
        breakeven_price(self.side, self.price_at_open, self.fee_rate)
    }

    /// Fee paid on the opening leg
    pub fn get_fee(&self) -> Decimal {
        self.price_at_open * self.size * self.fee_rate
    }

    /// Whether exiting at `price` would beat breakeven
    pub fn is_profitable_at(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price > self.get_profitable_sell_price(),
            Side::Sell => price < self.get_profitable_sell_price(),
        }
    }

    /// Whether exiting at the feed's latest price would beat breakeven
    pub async fn is_profitable(&self) -> bool {
        match self.feed.get_most_recent_tick().await {
            Some(tick) => self.is_profitable_at(tick.price),
            None => false,
        }
    }

    pub async fn state(&self) -> PositionState {
        self.flags.lock().await.state
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == PositionState::Open
    }

    pub async fn is_sold(&self) -> bool {
        self.state().await == PositionState::Sold
    }

    /// Latch the past-sell-min flag
    ///
    /// Once set it stays set; clearing requests are ignored.
    pub async fn set_past_sell_min(&self, value: bool) {
        let mut flags = self.flags.lock().await;
        if value {
            flags.past_sell_min = true;
        } else if flags.past_sell_min {
            tracing::debug!(position_id = %self.id, "Ignoring reset of latched sell-min flag");
        }
    }

    pub async fn get_past_sell_min(&self) -> bool {
        self.flags.lock().await.past_sell_min
    }

    /// Exit the full size with an opposing market order
    ///
    /// Returns `Ok(false)` without trading if the position is already
    /// terminal. On error the position stays open.
    pub async fn liquidate(&self) -> Result<bool, TradeError> {
        let mut flags = self.flags.lock().await;
        if flags.state.is_terminal() {
            return Ok(false);
        }

        let tick = self
            .feed
            .get_most_recent_tick()
            .await
            .ok_or_else(|| TradeError::NoPriceData(self.pair.clone()))?;

        let exit = self.side.opposite();
        let base = base_currency(&self.pair);

        match &self.ctx.gateway {
            Some(gateway) => {
                let ack = gateway
                    .place_order(OrderRequest::market(self.pair.clone(), exit, self.size))
                    .await?;
                if ack.is_rejected() {
                    return Err(TradeError::OrderRejected(
                        ack.reject_reason.unwrap_or(ack.id),
                    ));
                }
                mirror(&self.ctx.ledger, exit, base, self.size, &tick);
            }
            None => self.ctx.ledger.apply_trade(exit, base, self.size, &tick)?,
        }

        flags.state = PositionState::Sold;

        tracing::info!(
            position_id = %self.id,
            pair = %self.pair,
            side = %exit,
            size = %self.size,
            price = %tick.price,
            "Position liquidated"
        );

        Ok(true)
    }

    /// Cancel the resting order behind a gateway-backed position
    pub async fn cancel(&self) -> Result<(), TradeError> {
        let mut flags = self.flags.lock().await;

        let (Some(gateway), Some(order_id)) = (&self.ctx.gateway, &self.order_id) else {
            return Err(TradeError::NotCancelable);
        };

        if flags.state.is_terminal() {
            return Err(TradeError::CancelFailed(format!(
                "position {} is already {:?}",
                self.id, flags.state
            )));
        }

        gateway
            .cancel_order(order_id)
            .await
            .map_err(|e| TradeError::CancelFailed(e.to_string()))?;

        flags.state = PositionState::Canceled;
        tracing::info!(position_id = %self.id, order_id = %order_id, "Position canceled");
        Ok(())
    }
}

/// Record a gateway leg on the ledger; failures are logged, not raised
fn mirror(ledger: &LocalLedger, side: Side, currency: &str, amount: Decimal, tick: &Tick) {
    if let Err(e) = ledger.apply_trade(side, currency, amount, tick) {
        tracing::warn!(%side, %currency, error = %e, "Ledger mirror of gateway trade failed");
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position")
            .field("id", &self.id)
            .field("pair", &self.pair)
            .field("side", &self.side)
            .field("size", &self.size)
            .field("price_at_open", &self.price_at_open)
            .field("order_id", &self.order_id)
            .field("fee_rate", &self.fee_rate)
            .finish()
    }
}
