//! Trading types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Trading errors surfaced to whoever initiated the trade
#[derive(Debug, Error)]
pub enum TradeError {
    /// A simulated buy would overdraw the quote balance
    #[error("Insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: String,
        needed: Decimal,
        available: Decimal,
    },
    /// The gateway answered with a rejected status
    #[error("Order rejected: {0}")]
    OrderRejected(String),
    /// The gateway refused the cancellation
    #[error("Cancel failed: {0}")]
    CancelFailed(String),
    /// Paper positions have no resting order to cancel
    #[error("Position is not cancelable")]
    NotCancelable,
    /// The feed has not produced a tick yet
    #[error("No price data for {0}")]
    NoPriceData(String),
    #[error("Unknown position {0}")]
    UnknownPosition(Uuid),
    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}

/// Lifecycle state of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Open,
    Sold,
    Canceled,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionState::Open)
    }
}
