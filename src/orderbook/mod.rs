//! Order book module for managing market data.
//!
//! This module handles:
//! - Order book types and the ladder merge
//! - The shared per-market store read by the signal engine
//! - WebSocket connection for real-time updates

pub mod merge;
pub mod store;
pub mod types;
pub mod websocket;

pub use merge::{merge_side, normalize_side};
pub use store::OrderBookStore;
pub use types::{BookEventKind, BookSide, BookUpdate, OrderBook, PriceLevel, Quote, MAX_DEPTH};
pub use websocket::{decode_message, FeedEvent, MarketWebSocket, ReconnectConfig};
