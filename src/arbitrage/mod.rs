//! Arbitrage module: per-pair state, signal evaluation and capital sizing.
//!
//! This module handles:
//! - Pair state and position bookkeeping
//! - Spread, entry price and hedge profit calculations
//! - Start / increase / stop signal evaluation
//! - The capital ledger and batch sizing
//! - The engine that runs the periodic jobs

pub mod allocator;
pub mod calculator;
pub mod detector;
pub mod engine;
pub mod pair;

pub use allocator::{AllocationDecision, CapitalLedger};
pub use calculator::{
    current_next_apr, enter_spread, entry_prices, hedge_profit, inner_spread, outer_spread,
    EntryPrices, LegQuotes,
};
pub use detector::{evaluate, evaluate_entry, evaluate_stop, Evaluation, Signal, StopReason};
pub use engine::{ArbitrageEngine, CycleSummary, EngineSettings, EngineStatus, RefreshSummary};
pub use pair::{PairId, PositionSide, TrackedPair};
