//! Configuration loading end to end

use rust_decimal_macros::dec;
use tickbot::config::{Config, ExecutionMode};
use tickbot::feed::Exchange;

#[test]
fn test_example_config_builds_components() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, include_str!("../../config.toml.example")).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.feed.exchange, Exchange::CoinbasePro);
    assert_eq!(config.execution.mode, ExecutionMode::Local);

    let ledger = config.ledger.build(config.trading.fee_rate);
    assert_eq!(ledger.quote_currency(), "USD");
    assert_eq!(ledger.balance("USD"), dec!(1000));

    let profit = config.trading.profit_config();
    assert_eq!(profit.sell_min, dec!(0.002));
    assert_eq!(profit.emergency_sell_sample, 10);
}

#[test]
fn test_invalid_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    std::fs::write(&path, "[trading]\nsell_min = 1.5\n").unwrap();
    assert!(Config::load(&path).is_err());

    std::fs::write(&path, "[feed]\nexchange = \"kraken\"\n").unwrap();
    assert!(Config::load(&path).is_err());
}
