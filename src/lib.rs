//! tickbot: live ticker ingestion and profit-taking for crypto trading bots
//!
//! This library provides the core components for:
//! - Websocket ticker feeds from Coinbase Pro and Binance
//! - A registry of feeds keyed by exchange and pair
//! - Position lifecycle with fee-aware breakeven pricing
//! - A profit manager that locks in gains or exits on a falling trend
//! - A local paper ledger and a simulated exchange gateway
//! - CSV tick logs and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod execution;
pub mod feed;
pub mod model;
pub mod risk;
pub mod telemetry;
pub mod ws;
