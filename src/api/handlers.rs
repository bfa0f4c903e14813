//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::arbitrage::ArbitrageEngine;
use crate::report::{PairStatus, RoiReport};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Set once the market data feed has delivered its first book.
    pub ready: Arc<AtomicBool>,
    /// Engine queried for status.
    pub engine: Arc<ArbitrageEngine>,
}

impl AppState {
    /// Create new app state, not ready.
    pub fn new(engine: Arc<ArbitrageEngine>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            engine,
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Pairs tracked by the engine.
    pub pairs: usize,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Uncommitted capital.
    pub free_balance: Decimal,
    /// Pairs holding a position.
    pub open_pairs: usize,
    /// Pairs tracked.
    pub tracked_pairs: usize,
    /// Realised profit across pairs.
    pub total_profit: Decimal,
    /// Return summary.
    pub roi: RoiReport,
    /// Open pairs, highest average APR first.
    pub pairs: Vec<PairStatus>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        pairs: state.engine.pair_count(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns balance, profit and open pairs.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.engine.snapshot().await;
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        free_balance: snapshot.free_balance,
        open_pairs: snapshot.open_pairs,
        tracked_pairs: snapshot.tracked_pairs,
        total_profit: snapshot.roi.total_profit,
        roi: snapshot.roi,
        pairs: snapshot.pairs,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arbitrage::EngineSettings;
    use crate::config::StrategyParams;
    use crate::market::MockExchangeClient;
    use crate::notify::LogNotifier;
    use crate::orderbook::OrderBookStore;
    use rust_decimal_macros::dec;

    pub(crate) fn test_state() -> AppState {
        let engine = ArbitrageEngine::new(
            Vec::new(),
            Arc::new(OrderBookStore::new()),
            Arc::new(MockExchangeClient::new()),
            Arc::new(LogNotifier),
            EngineSettings {
                owner: "tester".to_string(),
                params: StrategyParams::default(),
                init_balance: dec!(1000),
                initial_free_balance: dec!(500),
            },
        );
        AppState::new(Arc::new(engine))
    }

    #[test]
    fn app_state_ready_toggle() {
        let state = test_state();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
