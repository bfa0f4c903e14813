//! Shared order book store.
//!
//! The feed task is the only writer. The signal engine reads cloned quotes so
//! no shard lock is held across an await point.

use dashmap::DashMap;

use super::types::{BookSide, OrderBook, PriceLevel, Quote};
use crate::error::OrderBookError;

/// Thread-safe map of market name to order book.
#[derive(Debug, Default)]
pub struct OrderBookStore {
    books: DashMap<String, OrderBook>,
}

impl OrderBookStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a market's book with a snapshot.
    pub fn apply_snapshot(&self, market: &str, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        self.books
            .entry(market.to_string())
            .or_insert_with(|| OrderBook::new(market))
            .apply_snapshot(bids, asks);
    }

    /// Merge delta rows into both sides of a market's book.
    pub fn apply_delta(&self, market: &str, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        let mut book = self
            .books
            .entry(market.to_string())
            .or_insert_with(|| OrderBook::new(market));
        if !bids.is_empty() {
            book.apply_delta(BookSide::Bid, bids);
        }
        if !asks.is_empty() {
            book.apply_delta(BookSide::Ask, asks);
        }
    }

    /// Best bid and ask for a market.
    pub fn quote(&self, market: &str) -> Result<Quote, OrderBookError> {
        self.books
            .get(market)
            .map(|b| b.quote())
            .ok_or_else(|| OrderBookError::UnknownMarket {
                market: market.to_string(),
            })
    }

    /// Clone of a market's full book.
    pub fn book(&self, market: &str) -> Option<OrderBook> {
        self.books.get(market).map(|b| b.clone())
    }

    /// Drop every book, e.g. before resubscribing.
    pub fn clear(&self) {
        self.books.clear();
    }

    /// Number of markets with a book.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// True when no book has been received yet.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
