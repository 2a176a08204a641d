//! Profit-taking manager
//!
//! Watches one feed and decides on every tick whether each open position
//! should be sold.
//!
//! For a buy with breakeven `b` the sell-min band runs from `b` to
//! `upper = b * (1 + sell_min)`, with `mid` halfway between. A price above
//! `upper` latches the position's past-sell-min flag. A latched position is
//! sold as soon as the price drops back strictly between `b` and `mid`. An
//! unlatched position in that zone is sold early only when the recent price
//! trend is falling. Sell positions use the mirror image of the band.

use super::{Position, TradeContext, TradeError};
use crate::execution::{OrderRequest, Side};
use crate::feed::{PriceFeed, PriceObserver, Tick};
use crate::model::{LinearRegression, TrendModel};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Sell policy parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitConfig {
    /// Width of the sell-min band as a fraction of breakeven
    pub sell_min: Decimal,
    /// Ticks used to estimate the recent trend
    pub emergency_sell_sample: usize,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            sell_min: Decimal::new(2, 3), // 0.2%
            emergency_sell_sample: 10,
        }
    }
}

/// Why a position was sold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellReason {
    /// Price came back into the band after clearing it
    LockInGains,
    /// Price is in the band and trending against the position
    FallingTrend,
}

/// Outcome of evaluating one position against one price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellDecision {
    Hold,
    /// Set the past-sell-min flag and keep holding
    Latch,
    Liquidate(SellReason),
}

/// Price band around a position's breakeven
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellBand {
    pub side: Side,
    pub breakeven: Decimal,
    /// Far edge: `breakeven * (1 ± sell_min)`
    pub threshold: Decimal,
    /// Halfway between breakeven and the far edge
    pub mid: Decimal,
}

impl SellBand {
    pub fn new(side: Side, breakeven: Decimal, sell_min: Decimal) -> Self {
        let threshold = match side {
            Side::Buy => breakeven * (Decimal::ONE + sell_min),
            Side::Sell => breakeven * (Decimal::ONE - sell_min),
        };
        let mid = threshold - (threshold - breakeven) / Decimal::TWO;

        Self {
            side,
            breakeven,
            threshold,
            mid,
        }
    }

    pub fn for_position(position: &Position, sell_min: Decimal) -> Self {
        Self::new(
            position.side(),
            position.get_profitable_sell_price(),
            sell_min,
        )
    }

    /// Price has cleared the far edge
    pub fn is_past_threshold(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price > self.threshold,
            Side::Sell => price < self.threshold,
        }
    }

    /// Price sits strictly between breakeven and mid
    pub fn in_trigger_zone(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => self.breakeven < price && price < self.mid,
            Side::Sell => self.mid < price && price < self.breakeven,
        }
    }

    /// Whether a trend slope points against the position
    pub fn is_adverse(&self, slope: f64) -> bool {
        match self.side {
            Side::Buy => slope < 0.0,
            Side::Sell => slope > 0.0,
        }
    }

    /// Apply the sell policy
    pub fn decide(&self, price: Decimal, latched: bool, slope: Option<f64>) -> SellDecision {
        if self.is_past_threshold(price) {
            return if latched {
                SellDecision::Hold
            } else {
                SellDecision::Latch
            };
        }

        if self.in_trigger_zone(price) {
            if latched {
                return SellDecision::Liquidate(SellReason::LockInGains);
            }
            if slope.is_some_and(|s| self.is_adverse(s)) {
                return SellDecision::Liquidate(SellReason::FallingTrend);
            }
        }

        SellDecision::Hold
    }
}

/// Holds the open positions of one feed and sells them per the band policy
pub struct ProfitManager {
    feed: Arc<PriceFeed>,
    config: ProfitConfig,
    trend: Box<dyn TrendModel>,
    positions: Mutex<Vec<Arc<Position>>>,
}

impl ProfitManager {
    /// Create a manager and subscribe it to `feed`
    pub async fn new(feed: Arc<PriceFeed>, config: ProfitConfig) -> Arc<Self> {
        Self::with_trend_model(feed, config, Box::new(LinearRegression)).await
    }

    pub async fn with_trend_model(
        feed: Arc<PriceFeed>,
        config: ProfitConfig,
        trend: Box<dyn TrendModel>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            feed: Arc::clone(&feed),
            config,
            trend,
            positions: Mutex::new(vec![]),
        });
        feed.append_callback(&manager).await;
        manager
    }

    pub fn feed(&self) -> &Arc<PriceFeed> {
        &self.feed
    }

    pub fn config(&self) -> &ProfitConfig {
        &self.config
    }

    /// Start managing an already open position
    pub async fn add_position(&self, position: Position) -> Arc<Position> {
        if position.pair() != self.feed.pair_id() {
            tracing::warn!(
                position_id = %position.id(),
                pair = %position.pair(),
                feed = %self.feed.pair_id(),
                "Managing position on a different pair than the feed"
            );
        }

        let position = Arc::new(position);
        let mut positions = self.positions.lock().await;
        positions.push(Arc::clone(&position));
        set_gauge(GaugeMetric::OpenPositions, positions.len() as f64);
        position
    }

    /// Open a position on this manager's feed and start managing it
    pub async fn open_position(
        &self,
        intent: OrderRequest,
        ctx: TradeContext,
    ) -> Result<Arc<Position>, TradeError> {
        let position = Position::open(intent, Arc::clone(&self.feed), ctx).await?;
        Ok(self.add_position(position).await)
    }

    /// Cancel a managed position and stop managing it
    pub async fn cancel(&self, id: Uuid) -> Result<(), TradeError> {
        let mut positions = self.positions.lock().await;
        let index = positions
            .iter()
            .position(|p| p.id() == id)
            .ok_or(TradeError::UnknownPosition(id))?;

        positions[index].cancel().await?;
        positions.remove(index);
        set_gauge(GaugeMetric::OpenPositions, positions.len() as f64);
        Ok(())
    }

    /// Snapshot of the managed positions
    pub async fn positions(&self) -> Vec<Arc<Position>> {
        self.positions.lock().await.clone()
    }

    pub async fn open_count(&self) -> usize {
        self.positions.lock().await.len()
    }

    async fn trend_slope(&self) -> Option<f64> {
        let points = self
            .feed
            .recent_prices(self.config.emergency_sell_sample)
            .await;
        self.trend.slope(&points)
    }

    /// Build the next generation of open positions for `tick`
    async fn evaluate(&self, tick: &Tick) {
        let mut positions = self.positions.lock().await;
        let mut next = Vec::with_capacity(positions.len());
        let mut slope: Option<Option<f64>> = None;

        for position in positions.drain(..) {
            if position.state().await.is_terminal() {
                continue;
            }

            let band = SellBand::for_position(&position, self.config.sell_min);
            let latched = position.get_past_sell_min().await;

            // Trend is only needed for an unlatched position in the zone
            let trend = if !latched && band.in_trigger_zone(tick.price) {
                match slope {
                    Some(s) => s,
                    None => {
                        let s = self.trend_slope().await;
                        slope = Some(s);
                        s
                    }
                }
            } else {
                None
            };

            match band.decide(tick.price, latched, trend) {
                SellDecision::Hold => next.push(position),
                SellDecision::Latch => {
                    position.set_past_sell_min(true).await;
                    tracing::info!(
                        position_id = %position.id(),
                        price = %tick.price,
                        threshold = %band.threshold,
                        "Price past sell-min band"
                    );
                    next.push(position);
                }
                SellDecision::Liquidate(reason) => match position.liquidate().await {
                    Ok(_) => {
                        increment(CounterMetric::Liquidations, position.pair());
                        tracing::info!(
                            position_id = %position.id(),
                            price = %tick.price,
                            breakeven = %band.breakeven,
                            ?reason,
                            "Sold position"
                        );
                    }
                    Err(e) => {
                        increment(CounterMetric::LiquidationFailures, position.pair());
                        tracing::error!(
                            position_id = %position.id(),
                            error = %e,
                            "Liquidation failed, keeping position"
                        );
                        next.push(position);
                    }
                },
            }
        }

        *positions = next;
        set_gauge(GaugeMetric::OpenPositions, positions.len() as f64);
    }
}

#[async_trait]
impl PriceObserver for ProfitManager {
    async fn on_price(&self, tick: &Tick) -> anyhow::Result<()> {
        self.evaluate(tick).await;
        Ok(())
    }
}
