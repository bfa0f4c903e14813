//! Mock exchange client for unit and integration testing.
//!
//! Serves canned market listings and funding data without network access.
//! Individual markets can be switched into a failing state to exercise the
//! engine's error paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use super::client::ExchangeClient;
use super::types::{FundingStats, MarketList};
use crate::error::ExchangeError;

#[derive(Debug, Default)]
struct MockState {
    markets: MarketList,
    history: HashMap<String, Vec<Decimal>>,
    next_rates: HashMap<String, Decimal>,
    failing: HashSet<String>,
    fail_market_list: bool,
    stats_calls: usize,
}

/// In-memory [`ExchangeClient`].
#[derive(Debug, Default)]
pub struct MockExchangeClient {
    state: Mutex<MockState>,
}

impl MockExchangeClient {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Listing returned by `fetch_market_list`.
    pub fn with_markets(self, markets: MarketList) -> Self {
        self.state().markets = markets;
        self
    }

    /// Set chronological funding history for a perpetual.
    pub fn set_history(&self, market: &str, rates: Vec<Decimal>) {
        self.state().history.insert(market.to_string(), rates);
    }

    /// Set the predicted next funding rate for a perpetual.
    pub fn set_next_rate(&self, market: &str, rate: Decimal) {
        self.state().next_rates.insert(market.to_string(), rate);
    }

    /// Make every query for `market` fail.
    pub fn fail_market(&self, market: &str) {
        self.state().failing.insert(market.to_string());
    }

    /// Let queries for `market` succeed again.
    pub fn recover_market(&self, market: &str) {
        self.state().failing.remove(market);
    }

    /// Make `fetch_market_list` fail.
    pub fn fail_market_list(&self, fail: bool) {
        self.state().fail_market_list = fail;
    }

    /// Number of `fetch_next_funding_stats` calls served so far.
    pub fn stats_calls(&self) -> usize {
        self.state().stats_calls
    }

    fn rejected(endpoint: &str) -> ExchangeError {
        ExchangeError::Rejected {
            endpoint: endpoint.to_string(),
            reason: "mock failure".to_string(),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    async fn fetch_market_list(&self) -> Result<MarketList, ExchangeError> {
        let state = self.state();
        if state.fail_market_list {
            return Err(Self::rejected("/api/markets"));
        }
        Ok(state.markets.clone())
    }

    async fn fetch_funding_rate_history(
        &self,
        market: &str,
        _start: OffsetDateTime,
        _end: OffsetDateTime,
    ) -> Result<Vec<Decimal>, ExchangeError> {
        let state = self.state();
        if state.failing.contains(market) {
            return Err(Self::rejected("/api/funding_rates"));
        }
        Ok(state.history.get(market).cloned().unwrap_or_default())
    }

    async fn fetch_next_funding_stats(&self, market: &str) -> Result<FundingStats, ExchangeError> {
        let mut state = self.state();
        state.stats_calls += 1;
        if state.failing.contains(market) {
            return Err(Self::rejected(&format!("/api/futures/{market}/stats")));
        }
        state
            .next_rates
            .get(market)
            .copied()
            .map(FundingStats::new)
            .ok_or_else(|| ExchangeError::Rejected {
                endpoint: format!("/api/futures/{market}/stats"),
                reason: "No such future".to_string(),
            })
    }
}
