//! Coinbase feed connector
//!
//! Connects to the Coinbase WebSocket feed, subscribes to the ticker and
//! heartbeat channels, and forwards raw text frames unparsed. All
//! classification happens downstream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{error, info, warn};
use url::Url;

use crate::connection::{ConnectionHandle, ConnectionState};
use crate::error::FeedError;
use crate::traits::Connector;

pub const DEFAULT_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

const FRAME_CHANNEL_CAPACITY: usize = 1000;

/// Subscribe request sent once after the socket opens.
#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    product_ids: &'a [String],
    channels: &'static [&'static str],
}

impl<'a> SubscribeRequest<'a> {
    fn new(product_ids: &'a [String]) -> Self {
        Self {
            msg_type: "subscribe",
            product_ids,
            channels: &["ticker", "heartbeat"],
        }
    }
}

/// WebSocket connector for the Coinbase ticker feed.
pub struct CoinbaseConnector {
    url: String,
    product_ids: Vec<String>,
    connection: ConnectionHandle,
    tx: Option<mpsc::Sender<String>>,
    rx: Option<mpsc::Receiver<String>>,
}

impl CoinbaseConnector {
    pub fn new(url: impl Into<String>, product_ids: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            url: url.into(),
            product_ids,
            connection: ConnectionHandle::new(),
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    fn spawn_reader_task(
        mut read: impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin
            + Send
            + 'static,
        tx: mpsc::Sender<String>,
        connection: ConnectionHandle,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if tx.send(text).await.is_err() {
                            info!("Frame channel closed, stopping Coinbase reader");
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        warn!("Coinbase WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Coinbase WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
            connection.set(ConnectionState::Disconnected);
        });
    }
}

#[async_trait]
impl Connector for CoinbaseConnector {
    async fn connect(&mut self) -> Result<(), FeedError> {
        // Idempotent: a connect while connecting or connected is a no-op
        if self.connection.state() != ConnectionState::Disconnected {
            return Ok(());
        }
        self.connection.set(ConnectionState::Connecting);

        let url = Url::parse(&self.url).map_err(|e| {
            self.connection.set(ConnectionState::Disconnected);
            FeedError::ConnectionFailed(e.to_string())
        })?;

        let (ws_stream, _) = connect_async(url).await.map_err(|e| {
            self.connection.set(ConnectionState::Disconnected);
            FeedError::ConnectionFailed(e.to_string())
        })?;

        let (mut write, read) = ws_stream.split();

        let subscribe = SubscribeRequest::new(&self.product_ids);
        let frame = serde_json::to_string(&subscribe)
            .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;
        write.send(WsMessage::Text(frame)).await.map_err(|e| {
            self.connection.set(ConnectionState::Disconnected);
            FeedError::SubscribeFailed(e.to_string())
        })?;

        info!(
            url = %self.url,
            product_ids = ?self.product_ids,
            "Subscribed to Coinbase ticker and heartbeat channels"
        );

        let tx = self
            .tx
            .take()
            .ok_or_else(|| FeedError::ConnectionFailed("connect() called twice".to_string()))?;
        Self::spawn_reader_task(read, tx, self.connection.clone());

        self.connection.set(ConnectionState::Connected);
        Ok(())
    }

    fn frames(&mut self) -> mpsc::Receiver<String> {
        self.rx
            .take()
            .expect("frames() called before connect() or called twice")
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        // Idempotent: a close while disconnected is a no-op
        if self.connection.state() == ConnectionState::Disconnected && self.tx.is_none() {
            return Ok(());
        }
        // Drop the sender to signal the reader task to stop
        self.tx = None;
        self.connection.set(ConnectionState::Disconnected);
        Ok(())
    }

    fn connection(&self) -> ConnectionHandle {
        self.connection.clone()
    }
}
