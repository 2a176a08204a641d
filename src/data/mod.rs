//! Data capture module
//!
//! Per-feed CSV logging of received ticks

mod csv_log;

pub use csv_log::{TickLogger, TICK_LOG_HEADER};
