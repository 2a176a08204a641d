//! Ordinary least squares slope

use super::TrendModel;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Least-squares slope of price against time
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegression;

impl TrendModel for LinearRegression {
    fn slope(&self, points: &[(f64, Decimal)]) -> Option<f64> {
        let points: Vec<(f64, f64)> = points
            .iter()
            .filter_map(|(time, price)| Some((*time, price.to_f64()?)))
            .collect();
        linear_slope(&points)
    }
}

/// Slope of the least-squares line through `(x, y)` points
///
/// Returns `None` with fewer than two points or when every x is equal.
pub fn linear_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    // Centered sums keep precision with epoch-sized x values
    let (covariance, variance) = points.iter().fold((0.0, 0.0), |(cov, var), (x, y)| {
        let dx = x - mean_x;
        (cov + dx * (y - mean_y), var + dx * dx)
    });

    if variance == 0.0 {
        return None;
    }

    Some(covariance / variance)
}
