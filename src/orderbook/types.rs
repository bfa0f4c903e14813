//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use super::merge::{merge_side, normalize_side};
use crate::error::OrderBookError;

/// Maximum number of rows kept per side.
pub const MAX_DEPTH: usize = 50;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Side of an order book ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy orders, best (highest) price first.
    #[strum(to_string = "bid", serialize = "bids")]
    Bid,
    /// Sell orders, best (lowest) price first.
    #[strum(to_string = "ask", serialize = "asks")]
    Ask,
}

impl BookSide {
    /// True if `a` sorts ahead of `b` on this side.
    pub fn is_better(&self, a: Decimal, b: Decimal) -> bool {
        match self {
            BookSide::Bid => a > b,
            BookSide::Ask => a < b,
        }
    }
}

/// L2 order book for one market.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Market name (e.g. `BTC-PERP`, `BTC/USD`).
    pub market: String,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// When this book was last updated.
    pub updated_at: OffsetDateTime,
}

impl OrderBook {
    /// Create an empty book for a market.
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// Levels for one side.
    pub fn side(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Replace both sides with a full snapshot.
    pub fn apply_snapshot(&mut self, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        self.bids = normalize_side(bids, BookSide::Bid);
        self.asks = normalize_side(asks, BookSide::Ask);
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Merge incremental rows into one side.
    pub fn apply_delta(&mut self, side: BookSide, rows: Vec<PriceLevel>) {
        let merged = merge_side(self.side(side), rows, side);
        match side {
            BookSide::Bid => self.bids = merged,
            BookSide::Ask => self.asks = merged,
        }
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Price paid when buying at market: the best ask.
    pub fn market_buy_price(&self) -> Result<Decimal, OrderBookError> {
        self.asks
            .first()
            .map(|l| l.price)
            .ok_or_else(|| self.empty(BookSide::Ask))
    }

    /// Price received when selling at market: the best bid.
    pub fn market_sell_price(&self) -> Result<Decimal, OrderBookError> {
        self.bids
            .first()
            .map(|l| l.price)
            .ok_or_else(|| self.empty(BookSide::Bid))
    }

    /// Top-of-book snapshot.
    pub fn quote(&self) -> Quote {
        Quote {
            market: self.market.clone(),
            best_bid: self.bids.first().map(|l| l.price),
            best_ask: self.asks.first().map(|l| l.price),
        }
    }

    fn empty(&self, side: BookSide) -> OrderBookError {
        OrderBookError::EmptySide {
            market: self.market.clone(),
            side,
        }
    }
}

/// Best bid/ask for one market at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Market name.
    pub market: String,
    /// Highest bid, if any.
    pub best_bid: Option<Decimal>,
    /// Lowest ask, if any.
    pub best_ask: Option<Decimal>,
}

impl Quote {
    /// Quote with both sides present.
    pub fn new(market: impl Into<String>, best_bid: Decimal, best_ask: Decimal) -> Self {
        Self {
            market: market.into(),
            best_bid: Some(best_bid),
            best_ask: Some(best_ask),
        }
    }

    /// Best ask or `EmptySide`.
    pub fn buy_price(&self) -> Result<Decimal, OrderBookError> {
        self.best_ask.ok_or_else(|| OrderBookError::EmptySide {
            market: self.market.clone(),
            side: BookSide::Ask,
        })
    }

    /// Best bid or `EmptySide`.
    pub fn sell_price(&self) -> Result<Decimal, OrderBookError> {
        self.best_bid.ok_or_else(|| OrderBookError::EmptySide {
            market: self.market.clone(),
            side: BookSide::Bid,
        })
    }
}

/// Kind of feed message that touched a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookEventKind {
    /// Full book snapshot.
    Snapshot,
    /// Incremental update.
    Delta,
}

/// Book update notification.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    /// Market that was updated.
    pub market: String,
    /// Type of event.
    pub kind: BookEventKind,
}
