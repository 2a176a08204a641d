//! Prometheus metrics

use metrics::{counter, gauge};

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Ticks appended to a feed
    TicksReceived,
    /// Frames skipped because they could not be decoded
    DecodeErrors,
    /// Subscriber failures that stopped a feed
    SubscriberFailures,
    /// Positions sold by the profit manager
    Liquidations,
    /// Liquidation attempts that failed
    LiquidationFailures,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Positions held by profit managers
    OpenPositions,
    /// Quote currency balance of the local ledger
    QuoteBalance,
}

impl CounterMetric {
    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::TicksReceived => "tickbot_ticks_received_total",
            CounterMetric::DecodeErrors => "tickbot_decode_errors_total",
            CounterMetric::SubscriberFailures => "tickbot_subscriber_failures_total",
            CounterMetric::Liquidations => "tickbot_liquidations_total",
            CounterMetric::LiquidationFailures => "tickbot_liquidation_failures_total",
        }
    }
}

impl GaugeMetric {
    pub fn name(&self) -> &'static str {
        match self {
            GaugeMetric::OpenPositions => "tickbot_open_positions",
            GaugeMetric::QuoteBalance => "tickbot_quote_balance",
        }
    }
}

/// Count one event for a pair
pub fn increment(metric: CounterMetric, pair: &str) {
    counter!(metric.name(), "pair" => pair.to_string()).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    gauge!(metric.name()).set(value);
}
