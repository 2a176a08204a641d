//! Price feeds against a local websocket server

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tickbot::feed::{Exchange, FeedError, FeedOptions, PriceFeed};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Serve one client: read its subscription, send `ack` and then `frames`
async fn serve_once(ack: &'static str, frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let subscribe = ws.next().await.unwrap().unwrap();
        assert!(subscribe.to_text().unwrap().contains("subscribe"));

        ws.send(Message::Text(ack.to_string())).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }

        // Hold the socket open until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    url
}

fn ticker(price: &str) -> String {
    format!(
        r#"{{"type":"ticker","product_id":"BTC-USD","price":"{price}","best_bid":"{price}","best_ask":"{price}","time":"2021-05-01T12:00:00.000000Z"}}"#
    )
}

#[tokio::test]
async fn test_open_receives_ticks() {
    let url = serve_once(
        r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#,
        vec![ticker("50000.01"), ticker("50001.5")],
    )
    .await;

    let feed = PriceFeed::open("BTC-USD", Exchange::CoinbasePro, FeedOptions::default().url(url))
        .await
        .unwrap();
    assert!(feed.is_websocket_open());
    assert!(feed.get_response().await.unwrap().contains("subscriptions"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while feed.len().await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let ticks = feed.get_ticker_feed().await;
    assert_eq!(ticks[0].price.to_string(), "50000.01");
    assert_eq!(ticks[1].price.to_string(), "50001.5");
    assert_eq!(feed.get_time_feed().await.len(), 2);

    feed.close();
    assert!(!feed.is_websocket_open());
}

#[tokio::test]
async fn test_rejected_subscription() {
    let url = serve_once(
        r#"{"type":"error","message":"Failed to subscribe","reason":"ETH-XYZ is not a valid product"}"#,
        vec![],
    )
    .await;

    let result =
        PriceFeed::open("ETH-XYZ", Exchange::CoinbasePro, FeedOptions::default().url(url)).await;

    match result {
        Err(FeedError::SubscriptionRejected(reason)) => {
            assert!(reason.contains("not a valid product"));
        }
        other => panic!("expected a rejected subscription, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = PriceFeed::open("BTC-USD", Exchange::CoinbasePro, FeedOptions::default().url(url)).await;
    assert!(matches!(result, Err(FeedError::Connection(_))));
}
