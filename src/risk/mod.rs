//! Risk management module
//!
//! Position lifecycle and the profit-taking sell policy

mod position;
mod profit;
mod types;

pub use position::{breakeven_price, Position, TradeContext};
pub use profit::{ProfitConfig, ProfitManager, SellBand, SellDecision, SellReason};
pub use types::{PositionState, TradeError};
