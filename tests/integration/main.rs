//! Integration tests for tickbot

mod config_test;
mod feed_test;
mod ledger_test;
mod profit_test;
mod ws_test;
