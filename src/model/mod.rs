//! Trend model module
//!
//! Short-horizon trend estimation over recent ticks

mod regression;

pub use regression::{linear_slope, LinearRegression};

use rust_decimal::Decimal;

/// Estimates the direction of recent prices
pub trait TrendModel: Send + Sync {
    /// Price change per second over `(epoch seconds, price)` points, oldest
    /// first; `None` when the points cannot support an estimate
    fn slope(&self, points: &[(f64, Decimal)]) -> Option<f64>;
}
