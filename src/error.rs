//! Unified error types for the funding-rate arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::BookSide;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Exchange query error.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Order book is missing data.
    #[error("order book error: {0}")]
    OrderBook(#[from] OrderBookError),

    /// Capital ledger error.
    #[error("allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Notification delivery error.
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or unloadable configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment deserialization failed.
    #[error("failed to load environment: {0}")]
    Env(#[from] envy::Error),

    /// A value failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending option name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Exchange REST query failures. Transient: retried at the next scheduled poll.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code.
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response envelope reported `success: false`.
    #[error("{endpoint} rejected the query: {reason}")]
    Rejected {
        /// Endpoint path.
        endpoint: String,
        /// Error text returned by the exchange.
        reason: String,
    },

    /// Response body could not be interpreted.
    #[error("failed to parse {endpoint} response: {reason}")]
    Parse {
        /// Endpoint path.
        endpoint: String,
        /// Parse failure detail.
        reason: String,
    },
}

/// Order book lookups that cannot be answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderBookError {
    /// No book has been received for the market.
    #[error("no orderbook for {market}")]
    UnknownMarket {
        /// Market name.
        market: String,
    },

    /// The requested side of the book has no rows.
    #[error("no available {side} orderbook for {market}")]
    EmptySide {
        /// Market name.
        market: String,
        /// Empty side.
        side: BookSide,
    },

    /// A top-of-book price is zero and cannot be used as a divisor.
    #[error("zero {side} price in {market} orderbook")]
    ZeroPrice {
        /// Market name.
        market: String,
        /// Side with the zero price.
        side: BookSide,
    },
}

/// Capital ledger failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// A debit would take the free balance below zero.
    #[error("cannot debit {requested}, free balance is {available}")]
    InsufficientBalance {
        /// Amount requested.
        requested: Decimal,
        /// Free balance at the time.
        available: Decimal,
    },
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// The exchange sent an error frame or a frame that breaks the channel
    /// protocol. The subscription has to be re-established.
    #[error("stream protocol error: {0}")]
    Protocol(String),

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Notification delivery failures. Logged, never fatal.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the message.
    #[error("notification rejected with HTTP {0}")]
    Rejected(u16),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
