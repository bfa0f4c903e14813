//! Market module for the exchange collaborator.
//!
//! This module handles:
//! - Market types and data structures
//! - Pair discovery (listing to hedged pairs)
//! - The `ExchangeClient` trait and its REST implementation
//! - Mock client for testing

pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use client::{ExchangeClient, RestExchangeClient};
pub use discovery::{
    build_pair_specs, discover_pairs, history_range, is_collateral_efficient, DiscoveredPair,
    DiscoverySettings,
};
pub use mock::MockExchangeClient;
pub use types::{FundingStats, MarketInfo, MarketList, MarketType, PairSpec};
