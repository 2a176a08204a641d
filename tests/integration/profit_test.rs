//! Profit manager driving positions through the paper gateway

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tickbot::execution::{ExchangeGateway, LocalLedger, OrderRequest, PaperGateway, Side};
use tickbot::feed::{Exchange, FeedOptions, PriceFeed};
use tickbot::risk::{PositionState, ProfitConfig, ProfitManager, TradeContext};
use tickbot::ws::WsMessage;
use tokio::sync::mpsc;

struct Market {
    tx: mpsc::Sender<WsMessage>,
    feed: Arc<PriceFeed>,
    second: u32,
}

impl Market {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        let feed =
            PriceFeed::from_source("BTC-USD", Exchange::CoinbasePro, FeedOptions::default(), rx)
                .unwrap();
        Self { tx, feed, second: 0 }
    }

    /// Push a tick and wait until every subscriber has seen it
    async fn tick(&mut self, price: Decimal) {
        let mut ticks = self.feed.subscribe_ticks();
        let frame = format!(
            r#"{{"type":"ticker","product_id":"BTC-USD","price":"{price}","time":"2021-05-01T12:{:02}:{:02}.000000Z"}}"#,
            self.second / 60,
            self.second % 60
        );
        self.second += 1;
        self.tx.send(WsMessage::Text(frame)).await.unwrap();
        ticks.recv().await.unwrap();
    }
}

#[tokio::test]
async fn test_gateway_position_latches_and_sells_once() {
    let mut market = Market::new();

    let gateway = Arc::new(PaperGateway::new("USD", dec!(0.005)).with_balance("USD", dec!(1000)));
    market.feed.append_callback(&gateway).await;
    market.tick(dec!(100)).await;

    let ledger = Arc::new(LocalLedger::new("USD", dec!(0.005)).with_balance("USD", dec!(1000)));
    let manager = ProfitManager::new(
        market.feed.clone(),
        ProfitConfig {
            sell_min: dec!(0.01),
            emergency_sell_sample: 10,
        },
    )
    .await;

    let position = manager
        .open_position(
            OrderRequest::market("BTC-USD", Side::Buy, dec!(1)),
            TradeContext::live(ledger.clone(), gateway.clone()),
        )
        .await
        .unwrap();

    assert!(position.order_id().is_some());
    assert_eq!(gateway.account().balance("BTC"), dec!(1));
    assert_eq!(ledger.balance("BTC"), dec!(1));

    market.tick(dec!(102.5)).await;
    assert!(position.get_past_sell_min().await);

    market.tick(dec!(101.2)).await;
    assert_eq!(position.state().await, PositionState::Sold);
    assert_eq!(manager.open_count().await, 0);

    // Later ticks in the band never trade again
    market.tick(dec!(101.3)).await;
    market.tick(dec!(101.1)).await;

    let fills = gateway.fills().await;
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0].side, Side::Buy);
    assert_eq!(fills[1].side, Side::Sell);
    assert_eq!(fills[1].price, dec!(101.2));

    // 1000 - 100.5 + 101.2 * 0.995
    assert_eq!(gateway.account().balance("USD"), dec!(1000.194));
    assert_eq!(ledger.balance("USD"), dec!(1000.194));
    assert_eq!(ledger.balance("BTC"), Decimal::ZERO);
}

#[tokio::test]
async fn test_rejected_open_is_not_managed() {
    let mut market = Market::new();

    let gateway = Arc::new(PaperGateway::new("USD", dec!(0.005)).with_balance("USD", dec!(50)));
    market.feed.append_callback(&gateway).await;
    market.tick(dec!(100)).await;

    let ledger = Arc::new(LocalLedger::new("USD", dec!(0.005)));
    let manager = ProfitManager::new(market.feed.clone(), ProfitConfig::default()).await;

    let result = manager
        .open_position(
            OrderRequest::market("BTC-USD", Side::Buy, dec!(1)),
            TradeContext::live(ledger.clone(), gateway.clone()),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(manager.open_count().await, 0);
    assert!(gateway.fills().await.is_empty());
    assert!(ledger.balances().is_empty());
}

#[tokio::test]
async fn test_limit_position_can_be_canceled() {
    let mut market = Market::new();

    let gateway = Arc::new(PaperGateway::new("USD", dec!(0.005)).with_balance("USD", dec!(1000)));
    market.feed.append_callback(&gateway).await;
    market.tick(dec!(100)).await;

    let ledger = Arc::new(LocalLedger::new("USD", dec!(0.005)).with_balance("USD", dec!(1000)));
    let manager = ProfitManager::new(market.feed.clone(), ProfitConfig::default()).await;

    let position = manager
        .open_position(
            OrderRequest::limit("BTC-USD", Side::Buy, dec!(1), dec!(90)),
            TradeContext::live(ledger.clone(), gateway.clone()),
        )
        .await
        .unwrap();
    assert_eq!(gateway.get_open_orders().await.unwrap().len(), 1);
    assert_eq!(ledger.balance("BTC"), Decimal::ZERO);

    manager.cancel(position.id()).await.unwrap();

    assert_eq!(position.state().await, PositionState::Canceled);
    assert_eq!(manager.open_count().await, 0);
    assert!(gateway.get_open_orders().await.unwrap().is_empty());

    // Nothing traded, on either side
    assert_eq!(ledger.balance("USD"), dec!(1000));
    assert_eq!(ledger.balance("BTC"), Decimal::ZERO);
    assert_eq!(gateway.account().balance("USD"), dec!(1000));
    assert!(gateway.fills().await.is_empty());
}
