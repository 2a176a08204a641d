//! Local ledger bookkeeping across paper positions

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tickbot::execution::{LocalLedger, Side};
use tickbot::feed::Tick;
use tickbot::risk::{breakeven_price, TradeError};

#[test]
fn test_round_trip_at_breakeven_is_flat() {
    let ledger = LocalLedger::new("USD", dec!(0.005)).with_balance("USD", dec!(1000));
    let open = Tick::at_price("BTC-USD", dec!(100), Utc::now());

    ledger.apply_trade(Side::Buy, "BTC", dec!(2), &open).unwrap();
    assert_eq!(ledger.balance("USD"), dec!(799)); // 1000 - 2 * 100 * 1.005

    // Selling at breakeven recovers the cost of the buy
    let exit = breakeven_price(Side::Buy, dec!(100), dec!(0.005));
    ledger.apply_trade_at(Side::Sell, "BTC", dec!(2), exit).unwrap();

    assert_eq!(ledger.balance("BTC"), dec!(0));
    assert_eq!(ledger.balance("USD").round_dp(8), dec!(1000));
}

#[test]
fn test_overdraft_leaves_ledger_untouched() {
    let ledger = LocalLedger::new("USD", dec!(0.005)).with_balance("USD", dec!(100));
    let before = ledger.balances();

    let err = ledger
        .apply_trade_at(Side::Buy, "ETH", dec!(1), dec!(100))
        .unwrap_err();

    match err {
        TradeError::InsufficientFunds {
            currency,
            needed,
            available,
        } => {
            assert_eq!(currency, "USD");
            assert_eq!(needed, dec!(100.5));
            assert_eq!(available, dec!(100));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(ledger.balances(), before);
}

#[tokio::test]
async fn test_concurrent_positions_share_one_ledger() {
    let ledger = Arc::new(LocalLedger::new("USD", dec!(0)).with_balance("USD", dec!(1000)));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.apply_trade_at(Side::Buy, "BTC", dec!(1), dec!(150)) })
        })
        .collect();

    let mut filled = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            filled += 1;
        }
    }

    // Only six buys of 150 fit in 1000
    assert_eq!(filled, 6);
    assert_eq!(ledger.balance("BTC"), dec!(6));
    assert_eq!(ledger.balance("USD"), dec!(100));
}
