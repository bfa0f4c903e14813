//! Funding-rate arbitrage engine for perpetual futures.
//!
//! A perpetual future pays or charges funding every hour. When longs pay a
//! high rate, shorting the perp and buying the same notional of spot earns
//! the funding while the two legs cancel each other's price risk:
//!
//! ```text
//! next funding rate:  +0.10% / hour
//! leverage:           5x across both legs
//! APR:                0.001 * 8760 * 5 / 2 = 21.9 (2190%)
//! position:           short BTC-PERP, long BTC/USD
//! ```
//!
//! The engine prices every pair from a live order book, opens a pair when
//! the rate and the entry spread clear their thresholds, grows it while the
//! spread keeps widening and closes it once the position would pay funding
//! and the legs can be unwound at no loss. Positions are simulated book
//! entries; no orders are sent.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Exchange client, pair discovery and market types
//! - [`orderbook`]: Order book store, merge and market data feed
//! - [`funding`]: Funding-rate history and APR arithmetic
//! - [`arbitrage`]: Pair state, signals, capital allocation and the engine
//! - [`schedule`]: Periodic jobs with an injectable clock
//! - [`report`]: ROI and pair status reports
//! - [`notify`]: Operator notifications
//! - [`api`]: HTTP API for health and status
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod funding;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod orderbook;
pub mod report;
pub mod schedule;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
