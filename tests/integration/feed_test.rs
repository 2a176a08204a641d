//! Feed registry over live websocket connections

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tickbot::data::TICK_LOG_HEADER;
use tickbot::feed::{Exchange, FeedError, FeedOptions, FeedRegistry, PriceObserver, Tick};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct Collector {
    prices: Mutex<Vec<Tick>>,
}

#[async_trait]
impl PriceObserver for Collector {
    async fn on_price(&self, tick: &Tick) -> anyhow::Result<()> {
        self.prices.lock().await.push(tick.clone());
        Ok(())
    }
}

/// Binance-style server answering the subscription and streaming trades
async fn binance_server(trades: Vec<(&'static str, i64)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let subscribe = ws.next().await.unwrap().unwrap();
        assert!(subscribe.to_text().unwrap().contains("btcusdt@trade"));
        ws.send(Message::Text(r#"{"result":null,"id":1}"#.into()))
            .await
            .unwrap();

        for (price, time) in trades {
            let frame = format!(
                r#"{{"e":"trade","E":{time},"s":"BTCUSDT","t":1,"p":"{price}","q":"0.25","T":{time},"m":false}}"#
            );
            ws.send(Message::Text(frame)).await.unwrap();
        }

        while let Some(Ok(_)) = ws.next().await {}
    });

    url
}

async fn wait_for<F, Fut>(mut done: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_registry_feed_delivers_and_logs() {
    let url = binance_server(vec![("64000.10", 1_619_870_400_000), ("64001.20", 1_619_870_401_000)]).await;
    let dir = tempfile::tempdir().unwrap();

    let mut registry = FeedRegistry::with_options(Exchange::Binance, FeedOptions::default().url(url))
        .with_log_dir(dir.path());
    let collector = Arc::new(Collector::default());

    let feed = registry.create_feed("BTCUSDT", &collector, None).await.unwrap();
    assert!(Arc::ptr_eq(&feed, &registry.get_feed("BTCUSDT", None).unwrap()));

    wait_for(|| async { collector.prices.lock().await.len() == 2 }).await;

    let prices = collector.prices.lock().await;
    assert_eq!(prices[0].price, dec!(64000.10));
    assert_eq!(prices[1].last_size, dec!(0.25));
    drop(prices);

    let times = feed.get_time_feed().await;
    assert_eq!(times, vec![1_619_870_400.0, 1_619_870_401.0]);

    registry.close_all();
    assert!(registry.is_empty());
    assert!(!feed.is_websocket_open());

    let path = dir.path().join("binance_BTCUSDT.csv");
    wait_for(|| {
        let path = path.clone();
        async move {
            std::fs::read_to_string(&path)
                .map(|content| content.lines().count() == 3)
                .unwrap_or(false)
        }
    })
    .await;

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().next().unwrap(), TICK_LOG_HEADER.join(","));
}

#[tokio::test]
async fn test_rejected_binance_subscription() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.next().await;
        ws.send(Message::Text(
            r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#.into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut registry = FeedRegistry::with_options(Exchange::Binance, FeedOptions::default().url(url));
    let collector = Arc::new(Collector::default());

    let result = registry.create_feed("BTCUSDT", &collector, None).await;
    assert!(matches!(result, Err(FeedError::SubscriptionRejected(ref msg)) if msg == "Invalid request"));
    assert!(registry.is_empty());
}
