//! WebSocket client for subscribe-then-stream feeds

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established, subscribed connection
pub struct WsConnection {
    /// First frame the server sent after the subscribe request
    pub ack: String,
    /// Frames received after the acknowledgment
    pub rx: mpsc::Receiver<WsMessage>,
}

/// WebSocket client that subscribes once and forwards frames to a channel
///
/// The client does not reconnect on its own. A broken transport ends with a
/// single [`WsMessage::Closed`] on the channel and the owner decides whether
/// to open a new connection.
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Create a new client with just a URL using default config
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect, send `subscribe` and wait for the server's first reply
    ///
    /// On success a background task keeps pumping frames into the returned
    /// receiver, answers pings and sends keepalive pings of its own. Setting
    /// `shutdown` to `true` closes the socket.
    pub async fn connect(
        &self,
        subscribe: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<WsConnection, WsError> {
        tracing::info!(url = %self.config.url, "Connecting to WebSocket");

        let (mut ws_stream, _response) =
            timeout(self.config.connect_timeout, connect_async(&self.config.url))
                .await
                .map_err(|_| WsError::ConnectionFailed("connect timed out".into()))?
                .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        ws_stream
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;

        let ack = timeout(self.config.ack_timeout, Self::next_text(&mut ws_stream))
            .await
            .map_err(|_| WsError::AckTimeout)??;

        tracing::info!(url = %self.config.url, "WebSocket subscribed");

        let (tx, rx) = mpsc::channel(1024);
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            if let Err(e) = Self::pump(ws_stream, &tx, shutdown, ping_interval).await {
                tracing::warn!(error = %e, "WebSocket connection ended with error");
            }
            let _ = tx.send(WsMessage::Closed).await;
        });

        Ok(WsConnection { ack, rx })
    }

    /// Read until the first text frame
    async fn next_text<S>(stream: &mut S) -> Result<String, WsError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            match msg.map_err(|e| WsError::ConnectionFailed(e.to_string()))? {
                Message::Text(text) => return Ok(text),
                Message::Close(_) => {
                    return Err(WsError::ConnectionFailed(
                        "closed before acknowledgment".into(),
                    ))
                }
                _ => {}
            }
        }

        Err(WsError::ConnectionFailed(
            "stream ended before acknowledgment".into(),
        ))
    }

    /// Forward frames until shutdown, close frame or transport error
    async fn pump(
        ws_stream: WsStream,
        tx: &mpsc::Sender<WsMessage>,
        mut shutdown: watch::Receiver<bool>,
        ping_interval: Duration,
    ) -> Result<(), WsError> {
        let (mut write, mut read) = ws_stream.split();

        if *shutdown.borrow_and_update() {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }

        let mut ping = tokio::time::interval(ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ping.tick().await;

        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    let closing = changed.is_err() || *shutdown.borrow_and_update();
                    if closing {
                        tracing::debug!("Shutdown requested, closing WebSocket");
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}
