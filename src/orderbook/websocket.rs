//! WebSocket client for the exchange order book channel.
//!
//! Features:
//! - One `subscribe` request per market on the `orderbook` channel
//! - Application-level ping on a fixed interval
//! - `partial` frames replace a book, `update` frames merge into it
//! - Automatic resubscription with exponential backoff

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::store::OrderBookStore;
use super::types::{BookEventKind, BookUpdate, PriceLevel};
use crate::error::WsError;
use crate::metrics;

const ORDERBOOK_CHANNEL: &str = "orderbook";

/// Subscription request sent once per market.
#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    op: &'static str,
    channel: &'static str,
    market: &'a str,
}

/// Envelope shared by every frame the exchange sends.
#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    channel: Option<String>,
    market: Option<String>,
    msg: Option<String>,
    data: Option<serde_json::Value>,
}

/// Payload of an `orderbook` channel frame.
#[derive(Debug, Deserialize)]
struct WsOrderbookData {
    action: String,
    #[serde(default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    asks: Vec<(Decimal, Decimal)>,
}

fn to_levels(rows: Vec<(Decimal, Decimal)>) -> Vec<PriceLevel> {
    rows.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect()
}

/// A decoded feed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Book rows for one market.
    Book {
        /// Market name.
        market: String,
        /// Snapshot or delta.
        kind: BookEventKind,
        /// Bid rows as received.
        bids: Vec<PriceLevel>,
        /// Ask rows as received.
        asks: Vec<PriceLevel>,
    },
    /// Acknowledgement, pong, info or another channel.
    Ignored,
}

/// Decode one text frame.
///
/// Returns `WsError::Protocol` for frames that break the channel contract
/// (error frames, missing `channel` or `market`) and `WsError::ParseError`
/// for an order book payload that cannot be read.
pub fn decode_message(text: &str) -> Result<FeedEvent, WsError> {
    let envelope: WsEnvelope =
        serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))?;

    match envelope.msg_type.as_deref() {
        Some("error") => {
            return Err(WsError::Protocol(
                envelope.msg.unwrap_or_else(|| text.to_string()),
            ))
        }
        Some("pong") | Some("info") | Some("subscribed") | Some("unsubscribed") => {
            return Ok(FeedEvent::Ignored)
        }
        _ => {}
    }

    let channel = envelope
        .channel
        .ok_or_else(|| WsError::Protocol(format!("frame without channel: {text}")))?;
    let market = envelope
        .market
        .ok_or_else(|| WsError::Protocol(format!("frame without market: {text}")))?;

    if channel != ORDERBOOK_CHANNEL {
        return Ok(FeedEvent::Ignored);
    }

    let data = envelope
        .data
        .ok_or_else(|| WsError::Protocol(format!("{market} frame without data")))?;
    let data: WsOrderbookData =
        serde_json::from_value(data).map_err(|e| WsError::ParseError(e.to_string()))?;

    let kind = match data.action.as_str() {
        "partial" => BookEventKind::Snapshot,
        "update" => BookEventKind::Delta,
        other => {
            return Err(WsError::ParseError(format!(
                "unknown orderbook action {other} for {market}"
            )))
        }
    };

    Ok(FeedEvent::Book {
        market,
        kind,
        bids: to_levels(data.bids),
        asks: to_levels(data.asks),
    })
}

/// Reconnection configuration for WebSocket.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Ping interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 15,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay_s,
            heartbeat_interval_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Consecutive failed sessions.
#[derive(Debug, Default, Clone, Copy)]
struct Backoff {
    attempt: u32,
}

impl Backoff {
    /// Delay before the next session. A session that got as far as
    /// subscribing starts the backoff over.
    fn after_session(&mut self, subscribed: bool, config: &ReconnectConfig) -> Duration {
        if subscribed {
            self.attempt = 0;
        }
        let delay = config.next_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

/// Maintains the order book subscription and feeds the shared store.
pub struct MarketWebSocket {
    /// Destination for decoded books.
    store: Arc<OrderBookStore>,
    /// WebSocket endpoint.
    ws_url: String,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Connection state.
    connected: AtomicBool,
    /// Reconnection attempt counter.
    reconnect_attempts: AtomicU64,
}

impl MarketWebSocket {
    /// Create a new feed client writing into `store`.
    pub fn new(ws_url: impl Into<String>, store: Arc<OrderBookStore>) -> Self {
        Self::with_reconnect_config(ws_url, store, ReconnectConfig::default())
    }

    /// Create with custom reconnection config.
    pub fn with_reconnect_config(
        ws_url: impl Into<String>,
        store: Arc<OrderBookStore>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            store,
            ws_url: ws_url.into(),
            reconnect_config: config,
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get reconnection attempt count.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Apply one text frame to the store.
    ///
    /// Undecodable payloads are logged and skipped. Protocol errors are
    /// returned so the caller can drop the connection.
    pub fn handle_text(&self, text: &str) -> Result<Option<BookUpdate>, WsError> {
        metrics::inc_ws_messages_received();
        let start = Instant::now();

        let event = match decode_message(text) {
            Ok(event) => event,
            Err(WsError::ParseError(reason)) => {
                warn!(reason = %reason, "Skipping undecodable orderbook payload");
                metrics::inc_ws_decode_errors();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let update = match event {
            FeedEvent::Book {
                market,
                kind,
                bids,
                asks,
            } => {
                match kind {
                    BookEventKind::Snapshot => self.store.apply_snapshot(&market, bids, asks),
                    BookEventKind::Delta => self.store.apply_delta(&market, bids, asks),
                }
                Some(BookUpdate { market, kind })
            }
            FeedEvent::Ignored => {
                debug!(frame = %text, "Ignoring control frame");
                None
            }
        };

        metrics::record_ws_message_latency(start);
        Ok(update)
    }

    /// Run one connection until it fails or `cancel` fires.
    async fn run_session(
        &self,
        markets: &[String],
        tx: &mpsc::Sender<BookUpdate>,
        cancel: &CancellationToken,
    ) -> Result<(), WsError> {
        info!(url = %self.ws_url, markets = markets.len(), "Connecting to WebSocket");

        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        for market in markets {
            let msg = serde_json::to_string(&SubscribeMessage {
                op: "subscribe",
                channel: ORDERBOOK_CHANNEL,
                market,
            })
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
            write
                .send(Message::Text(msg))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }
        info!(markets = markets.len(), "Subscribed to orderbook channel");
        self.connected.store(true, Ordering::SeqCst);

        let mut ping = tokio::time::interval(Duration::from_secs(
            self.reconnect_config.heartbeat_interval_s,
        ));
        ping.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    write
                        .send(Message::Text(r#"{"op":"ping"}"#.to_string()))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(update) = self.handle_text(&text)? {
                            if tx.send(update).await.is_err() {
                                info!("Update channel closed, stopping WebSocket");
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(WsError::ConnectionClosed {
                            code: frame.as_ref().map(|f| u16::from(f.code)),
                            reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(WsError::ConnectionClosed {
                            code: None,
                            reason: "stream ended".to_string(),
                        });
                    }
                },
            }
        }
    }

    /// Spawn the feed task. Resubscribes with backoff until cancelled.
    pub fn spawn(
        self: Arc<Self>,
        markets: Vec<String>,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<BookUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1000);

        let handle = tokio::spawn(async move {
            let mut backoff = Backoff::default();

            loop {
                let result = self.run_session(&markets, &tx, &cancel).await;
                let subscribed = self.connected.swap(false, Ordering::SeqCst);

                match result {
                    Ok(()) => return,
                    Err(e) => {
                        error!(error = %e, attempt = backoff.attempt, subscribed, "WebSocket session ended");
                        // stale books must not be priced while resubscribing
                        self.store.clear();
                    }
                }

                let delay = backoff.after_session(subscribed, &self.reconnect_config);
                self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                metrics::inc_ws_reconnects();
                info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        (rx, handle)
    }
}
