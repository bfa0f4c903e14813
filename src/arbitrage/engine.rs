//! The arbitrage engine: pair registry, capital ledger and the periodic jobs.
//!
//! Pairs live in an arena of `tokio::sync::Mutex<TrackedPair>` addressed by
//! [`PairId`]. The ledger has its own mutex. Whenever both are held the ledger
//! is taken first; a stop releases the pair before crediting the ledger.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::allocator::{AllocationDecision, CapitalLedger};
use super::calculator::{entry_prices, hedge_profit, EntryPrices, LegQuotes};
use super::detector::{evaluate, Signal, StopReason};
use super::pair::{PairId, PositionSide, TrackedPair};
use crate::config::{Config, StrategyKind, StrategyParams};
use crate::error::OrderBookError;
use crate::market::{DiscoveredPair, ExchangeClient, PairSpec};
use crate::metrics;
use crate::notify::{notify_owner, Notifier};
use crate::orderbook::OrderBookStore;
use crate::report::{apr_ranking, PairStatus, RoiReport};

/// Engine-wide settings that are not per-cycle strategy parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Name attached to notifications.
    pub owner: String,
    /// Thresholds and sizing.
    pub params: StrategyParams,
    /// Reference balance for ROI.
    pub init_balance: Decimal,
    /// Starting free capital.
    pub initial_free_balance: Decimal,
}

impl EngineSettings {
    /// Settings from config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner: config.bot_owner.clone(),
            params: config.strategy_params(),
            init_balance: config.init_balance,
            initial_free_balance: config.initial_free_balance,
        }
    }
}

/// What one signal cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Pairs evaluated successfully.
    pub evaluated: usize,
    /// Pairs skipped because quotes were unusable.
    pub errors: usize,
    /// Pairs opened.
    pub started: usize,
    /// Pairs grown.
    pub increased: usize,
    /// Pairs closed.
    pub stopped: usize,
    /// Entry batch declined for lack of capital.
    pub allocation_skipped: bool,
    /// Signals seen but not acted on.
    pub observed: usize,
}

/// What one funding refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Pairs with a fresh next rate.
    pub updated: usize,
    /// Pairs whose query failed.
    pub failed: usize,
    /// Pairs credited with hourly funding.
    pub accrued: usize,
}

/// Point-in-time view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Uncommitted capital.
    pub free_balance: Decimal,
    /// Pairs holding a position.
    pub open_pairs: usize,
    /// Pairs tracked.
    pub tracked_pairs: usize,
    /// Whole-book return summary.
    pub roi: RoiReport,
    /// Open pairs, highest average APR first.
    pub pairs: Vec<PairStatus>,
}

/// A pair that asked for capital this cycle.
#[derive(Debug, Clone, Copy)]
struct Trigger {
    id: PairId,
    signal: Signal,
    side: PositionSide,
    prices: EntryPrices,
    next_apr: Decimal,
}

/// Funding-rate arbitrage engine.
pub struct ArbitrageEngine {
    pairs: Vec<Mutex<TrackedPair>>,
    ledger: Mutex<CapitalLedger>,
    cycle: Mutex<()>,
    markets: Vec<String>,
    books: Arc<OrderBookStore>,
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    params: StrategyParams,
    owner: String,
    init_balance: Decimal,
    started_at: Instant,
}

impl ArbitrageEngine {
    /// Build the registry from discovered pairs. Ids follow discovery order.
    pub fn new(
        discovered: Vec<DiscoveredPair>,
        books: Arc<OrderBookStore>,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        let mut markets: Vec<String> = Vec::new();
        let mut pairs = Vec::with_capacity(discovered.len());
        for (idx, d) in discovered.into_iter().enumerate() {
            for m in d.spec.required_markets() {
                if !markets.contains(&m) {
                    markets.push(m);
                }
            }
            pairs.push(Mutex::new(TrackedPair::new(
                PairId(idx),
                d.spec,
                d.history,
                settings.params.leverage,
            )));
        }

        Self {
            pairs,
            ledger: Mutex::new(CapitalLedger::new(settings.initial_free_balance)),
            cycle: Mutex::new(()),
            markets,
            books,
            exchange,
            notifier,
            params: settings.params,
            owner: settings.owner,
            init_balance: settings.init_balance,
            started_at: Instant::now(),
        }
    }

    /// Strategy parameters in force.
    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Number of tracked pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Every market the feed must subscribe to.
    pub fn required_markets(&self) -> &[String] {
        &self.markets
    }

    /// Clone of one pair's state.
    pub async fn pair(&self, id: PairId) -> Option<TrackedPair> {
        match self.pairs.get(id.0) {
            Some(slot) => Some(slot.lock().await.clone()),
            None => None,
        }
    }

    /// Current free balance.
    pub async fn free_balance(&self) -> Decimal {
        self.ledger.lock().await.free_balance()
    }

    fn leg_quotes(&self, spec: &PairSpec) -> Result<LegQuotes, OrderBookError> {
        Ok(LegQuotes {
            perp: self.books.quote(&spec.perp_market)?,
            hedge: self.books.quote(&spec.hedge_market)?,
        })
    }

    async fn notify(&self, messages: Vec<String>) {
        for text in messages {
            notify_owner(self.notifier.as_ref(), &self.owner, &text).await;
        }
    }

    /// Evaluate every pair once and act on the signals.
    ///
    /// Stops are applied immediately. Starts and increases are collected and
    /// sized together against the ledger.
    #[instrument(skip(self))]
    pub async fn run_signal_cycle(&self) -> CycleSummary {
        let cycle_guard = self.cycle.lock().await;
        let _timer = metrics::timer_signal_cycle();
        let mut summary = CycleSummary::default();
        let mut triggers = Vec::new();
        let mut messages = Vec::new();

        for slot in &self.pairs {
            let mut pair = slot.lock().await;
            let quotes = match self.leg_quotes(&pair.spec) {
                Ok(q) => q,
                Err(e) => {
                    debug!(pair = %pair.name(), error = %e, "Skipping pair this cycle");
                    summary.errors += 1;
                    continue;
                }
            };
            let eval = match evaluate(&pair, &quotes, &self.params) {
                Ok(eval) => eval,
                Err(e) => {
                    debug!(pair = %pair.name(), error = %e, "Evaluation aborted");
                    summary.errors += 1;
                    continue;
                }
            };
            summary.evaluated += 1;

            if self.params.kind == StrategyKind::Observe {
                if eval.signal != Signal::Hold {
                    info!(pair = %pair.name(), signal = ?eval.signal, next_apr = %eval.next_apr, "Signal observed");
                    summary.observed += 1;
                }
                continue;
            }

            match eval.signal {
                Signal::Hold => {}
                Signal::Stop(reason) => {
                    match self.close_locked(&mut pair, &quotes, reason, eval.next_apr) {
                        Ok((credit, mut texts)) => {
                            drop(pair);
                            self.ledger.lock().await.credit(credit);
                            summary.stopped += 1;
                            messages.append(&mut texts);
                        }
                        Err(e) => {
                            warn!(pair = %pair.name(), error = %e, "Cannot price stop");
                            summary.errors += 1;
                        }
                    }
                }
                Signal::Start | Signal::Increase => {
                    let side = PositionSide::for_rate(pair.next_funding_rate);
                    match entry_prices(side, &quotes) {
                        Ok(prices) => triggers.push(Trigger {
                            id: pair.id,
                            signal: eval.signal,
                            side,
                            prices,
                            next_apr: eval.next_apr,
                        }),
                        Err(e) => {
                            debug!(pair = %pair.name(), error = %e, "Cannot price entry");
                            summary.errors += 1;
                        }
                    }
                }
            }
        }

        if !triggers.is_empty() {
            self.apply_entries(triggers, &mut summary, &mut messages).await;
        }

        metrics::set_open_pairs(self.open_pair_count().await);
        drop(cycle_guard);
        self.notify(messages).await;
        summary
    }

    /// Apply a stop to a locked pair. Nothing is mutated on error.
    fn close_locked(
        &self,
        pair: &mut TrackedPair,
        quotes: &LegQuotes,
        reason: StopReason,
        next_apr: Decimal,
    ) -> Result<(Decimal, Vec<String>), OrderBookError> {
        let profit = hedge_profit(pair.size, pair.perp_enter_price, pair.hedge_enter_price, quotes)?;
        let size = pair.size;
        let credit = pair.apply_stop(profit, self.params.fee_rate, self.params.leverage);
        metrics::inc_pairs_stopped(reason.label());
        info!(
            pair = %pair.name(),
            size = %size,
            hedge_profit = %profit,
            reason = %reason,
            "Stopped pair"
        );

        Ok((
            credit,
            vec![
                format!("stop earning on {}, size {:.2}", pair.name(), size),
                format!("final hedge profit: {:.2}", profit),
                format!(
                    "not profitable: {}\nstop reason: {}\nnextAPR: {:.2}%",
                    pair.name(),
                    reason,
                    next_apr * Decimal::ONE_HUNDRED
                ),
            ],
        ))
    }

    async fn apply_entries(
        &self,
        triggers: Vec<Trigger>,
        summary: &mut CycleSummary,
        messages: &mut Vec<String>,
    ) {
        let mut ledger = self.ledger.lock().await;
        let (per_pair_size, total) = match ledger.decide(triggers.len(), &self.params) {
            AllocationDecision::Allocate { per_pair_size, total } => (per_pair_size, total),
            AllocationDecision::Skipped { allocated, required } => {
                info!(
                    pairs = triggers.len(),
                    allocated = %allocated,
                    required = %required,
                    "Not enough free balance, skipping entries"
                );
                metrics::inc_allocations_skipped();
                summary.allocation_skipped = true;
                return;
            }
        };
        if let Err(e) = ledger.debit(total) {
            warn!(error = %e, "Allocation rejected");
            summary.allocation_skipped = true;
            return;
        }

        for t in triggers {
            let Some(slot) = self.pairs.get(t.id.0) else {
                continue;
            };
            let mut pair = slot.lock().await;
            let increase = t.signal == Signal::Increase;
            if increase {
                pair.apply_increase(t.side, per_pair_size, t.prices.perp, t.prices.hedge, self.params.fee_rate);
                metrics::inc_pairs_increased();
                summary.increased += 1;
                messages.push(format!("increase size {:.2} on {}", per_pair_size, pair.name()));
            } else {
                pair.apply_start(t.side, per_pair_size, t.prices.perp, t.prices.hedge, self.params.fee_rate);
                metrics::inc_pairs_started();
                summary.started += 1;
                messages.push(format!("start earning on {}, size {:.2}", pair.name(), pair.size));
            }
            info!(
                pair = %pair.name(),
                size = %pair.size,
                perp_price = %pair.perp_enter_price,
                hedge_price = %pair.hedge_enter_price,
                increase,
                "Entered pair"
            );
            messages.push(format!(
                "profitable: {}\navgAPR: {:.2}%\nnextAPR: {:.2}%\nincrease: {}",
                pair.name(),
                pair.average_annualized_rate * Decimal::ONE_HUNDRED,
                t.next_apr * Decimal::ONE_HUNDRED,
                increase
            ));
        }
    }

    /// Close `id` at current quotes, regardless of signals.
    ///
    /// Returns the capital credited back, or `None` when the pair was flat.
    pub async fn stop_pair(&self, id: PairId, reason: StopReason) -> Result<Option<Decimal>, OrderBookError> {
        let Some(slot) = self.pairs.get(id.0) else {
            return Ok(None);
        };
        let mut pair = slot.lock().await;
        if !pair.is_open() {
            return Ok(None);
        }
        let quotes = self.leg_quotes(&pair.spec)?;
        let next_apr = pair.next_apr(self.params.leverage);
        let (credit, messages) = self.close_locked(&mut pair, &quotes, reason, next_apr)?;
        drop(pair);
        self.ledger.lock().await.credit(credit);
        self.notify(messages).await;
        Ok(Some(credit))
    }

    async fn perp_market(&self, slot: &Mutex<TrackedPair>) -> String {
        slot.lock().await.spec.perp_market.clone()
    }

    /// Hourly job: fetch next rates into the windows, book the settled
    /// funding for pairs held through the hour and start a new hour.
    #[instrument(skip(self))]
    pub async fn refresh_funding(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let mut refreshed = vec![false; self.pairs.len()];
        for (idx, slot) in self.pairs.iter().enumerate() {
            let market = self.perp_market(slot).await;
            match self.exchange.fetch_next_funding_stats(&market).await {
                Ok(stats) => {
                    let mut pair = slot.lock().await;
                    pair.ingest_next_rate(stats.next_funding_rate, self.params.leverage);
                    refreshed[idx] = true;
                    debug!(
                        pair = %pair.name(),
                        next_rate = %pair.next_funding_rate,
                        next_apr = %pair.next_apr(self.params.leverage),
                        average_apr = %pair.average_annualized_rate,
                        "Ingested next funding rate"
                    );
                    summary.updated += 1;
                }
                Err(e) => {
                    warn!(market = %market, error = %e, "Failed to refresh funding rate");
                    summary.failed += 1;
                }
            }
        }

        // a pair whose window did not rotate has no newly settled rate
        summary.accrued = self
            .accrue_hourly(|id| refreshed.get(id.0).copied().unwrap_or(false))
            .await;
        self.rotate_hour().await;
        self.log_ranking().await;
        info!(
            updated = summary.updated,
            failed = summary.failed,
            accrued = summary.accrued,
            "Funding refresh complete"
        );
        summary
    }

    /// Book one hour of funding on every eligible open pair.
    ///
    /// Pairs opened this hour, pairs without a settled rate and pairs whose
    /// quotes are unusable are left unchanged. Returns the number credited.
    pub async fn update_hourly_profit(&self) -> usize {
        self.accrue_hourly(|_| true).await
    }

    async fn accrue_hourly(&self, eligible: impl Fn(PairId) -> bool) -> usize {
        let mut accrued = 0;
        let mut messages = Vec::new();
        for slot in &self.pairs {
            let mut pair = slot.lock().await;
            if !pair.is_open() || pair.opened_this_hour {
                continue;
            }
            if !eligible(pair.id) {
                debug!(pair = %pair.name(), "Funding not refreshed, hourly profit skipped");
                continue;
            }
            let Some(settled) = pair.funding.latest_settled() else {
                continue;
            };
            let profit = match self
                .leg_quotes(&pair.spec)
                .and_then(|q| hedge_profit(pair.size, pair.perp_enter_price, pair.hedge_enter_price, &q))
            {
                Ok(p) => p,
                Err(e) => {
                    warn!(pair = %pair.name(), error = %e, "Cannot mark pair, hourly profit skipped");
                    continue;
                }
            };
            let hourly = pair.apply_hourly_profit(settled, profit);
            info!(pair = %pair.name(), earned = %hourly, "Booked hourly funding");
            messages.push(format!("earned {:.2} USD on {}", hourly, pair.name()));
            accrued += 1;
        }
        self.notify(messages).await;
        accrued
    }

    /// Forget which pairs were opened during the hour that just closed.
    pub async fn rotate_hour(&self) {
        for slot in &self.pairs {
            slot.lock().await.opened_this_hour = false;
        }
    }

    /// Half-hourly job: refresh predicted rates without touching the windows.
    #[instrument(skip(self))]
    pub async fn poll_next_rates(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for slot in &self.pairs {
            let market = self.perp_market(slot).await;
            match self.exchange.fetch_next_funding_stats(&market).await {
                Ok(stats) => {
                    slot.lock().await.next_funding_rate = stats.next_funding_rate;
                    summary.updated += 1;
                }
                Err(e) => {
                    warn!(market = %market, error = %e, "Failed to poll next funding rate");
                    summary.failed += 1;
                }
            }
        }
        debug!(updated = summary.updated, failed = summary.failed, "Polled next funding rates");
        summary
    }

    /// Status of every pair.
    pub async fn pair_statuses(&self) -> Vec<PairStatus> {
        let mut statuses = Vec::with_capacity(self.pairs.len());
        for slot in &self.pairs {
            statuses.push(PairStatus::from_pair(&*slot.lock().await, self.params.leverage));
        }
        statuses
    }

    async fn open_pair_count(&self) -> usize {
        let mut open = 0;
        for slot in &self.pairs {
            if slot.lock().await.is_open() {
                open += 1;
            }
        }
        open
    }

    /// Consistent view of the ledger and every pair.
    pub async fn snapshot(&self) -> EngineStatus {
        let ledger = self.ledger.lock().await;
        let statuses = self.pair_statuses().await;
        let free_balance = ledger.free_balance();
        drop(ledger);

        let roi = RoiReport::compute(
            &statuses,
            self.init_balance,
            free_balance,
            self.started_at.elapsed(),
        );
        let pairs: Vec<PairStatus> = apr_ranking(&statuses)
            .into_iter()
            .filter(|s| s.is_open())
            .cloned()
            .collect();
        EngineStatus {
            free_balance,
            open_pairs: pairs.len(),
            tracked_pairs: statuses.len(),
            roi,
            pairs,
        }
    }

    /// Send the open-pair statuses and the ROI report.
    #[instrument(skip(self))]
    pub async fn send_reports(&self) {
        let status = self.snapshot().await;
        let mut messages: Vec<String> = status.pairs.iter().map(ToString::to_string).collect();
        messages.push(status.roi.to_string());
        self.notify(messages).await;
    }

    async fn log_ranking(&self) {
        let statuses = self.pair_statuses().await;
        info!("avgAPR rank:");
        for s in apr_ranking(&statuses) {
            info!(
                pair = %s.name,
                average_apr = %s.average_apr,
                next_apr = %s.next_apr,
                consecutive = s.consecutive_sign_count,
                "rank"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::FundingWindow;
    use crate::market::MockExchangeClient;
    use crate::notify::RecordingNotifier;
    use crate::orderbook::PriceLevel;
    use rust_decimal_macros::dec;

    fn discovered(base: &str, history: Vec<Decimal>) -> DiscoveredPair {
        DiscoveredPair {
            spec: PairSpec::spot_hedged(base, true),
            history: FundingWindow::from_chronological(history, 168),
        }
    }

    fn engine(
        pairs: Vec<DiscoveredPair>,
        free: Decimal,
    ) -> (ArbitrageEngine, Arc<OrderBookStore>, Arc<MockExchangeClient>, Arc<RecordingNotifier>) {
        let books = Arc::new(OrderBookStore::new());
        let exchange = Arc::new(MockExchangeClient::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = ArbitrageEngine::new(
            pairs,
            books.clone(),
            exchange.clone(),
            notifier.clone(),
            EngineSettings {
                owner: "tester".to_string(),
                params: StrategyParams::default(),
                init_balance: dec!(10000),
                initial_free_balance: free,
            },
        );
        (engine, books, exchange, notifier)
    }

    fn book(store: &OrderBookStore, market: &str, bid: Decimal, ask: Decimal) {
        store.apply_snapshot(
            market,
            vec![PriceLevel::new(bid, dec!(10))],
            vec![PriceLevel::new(ask, dec!(10))],
        );
    }

    #[tokio::test]
    async fn registry_lists_required_markets_once() {
        let (engine, ..) = engine(vec![discovered("BTC", vec![]), discovered("ETH", vec![])], dec!(1000));

        assert_eq!(engine.pair_count(), 2);
        assert_eq!(
            engine.required_markets(),
            &["BTC-PERP", "BTC/USD", "ETH-PERP", "ETH/USD"]
        );
    }

    #[tokio::test]
    async fn refresh_ingests_rate_and_tolerates_failures() {
        let (engine, _, exchange, _) =
            engine(vec![discovered("BTC", vec![dec!(0.0001)]), discovered("ETH", vec![])], dec!(1000));
        exchange.set_next_rate("BTC-PERP", dec!(0.0002));
        exchange.fail_market("ETH-PERP");

        let summary = engine.refresh_funding().await;

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 1);
        let btc = engine.pair(PairId(0)).await.unwrap();
        assert_eq!(btc.next_funding_rate, dec!(0.0002));
        assert_eq!(btc.funding.len(), 2);
        assert_eq!(btc.consecutive_sign_count, 2);
        let eth = engine.pair(PairId(1)).await.unwrap();
        assert!(eth.funding.is_empty());
    }

    #[tokio::test]
    async fn poll_only_touches_next_rate() {
        let (engine, _, exchange, _) = engine(vec![discovered("BTC", vec![dec!(0.0001)])], dec!(1000));
        exchange.set_next_rate("BTC-PERP", dec!(-0.0003));

        engine.poll_next_rates().await;

        let btc = engine.pair(PairId(0)).await.unwrap();
        assert_eq!(btc.next_funding_rate, dec!(-0.0003));
        assert_eq!(btc.funding.len(), 1);
    }

    #[tokio::test]
    async fn hourly_profit_skips_pairs_opened_this_hour() {
        let (engine, books, _, notifier) = engine(vec![discovered("BTC", vec![])], dec!(10000));
        book(&books, "BTC-PERP", dec!(101), dec!(101.5));
        book(&books, "BTC/USD", dec!(99.9), dec!(100));
        {
            let mut pair = engine.pairs[0].lock().await;
            pair.ingest_next_rate(dec!(0.0001), dec!(5));
            pair.ingest_next_rate(dec!(0.001), dec!(5));
        }

        let summary = engine.run_signal_cycle().await;
        assert_eq!(summary.started, 1);

        assert_eq!(engine.update_hourly_profit().await, 0);
        engine.rotate_hour().await;
        assert_eq!(engine.update_hourly_profit().await, 1);

        let pair = engine.pair(PairId(0)).await.unwrap();
        // short 5000 notional earns 5000 * 0.0001
        assert_eq!(pair.hourly_funding_rate_profit, dec!(0.5));
        assert!(notifier.messages().iter().any(|m| m == "earned 0.50 USD on BTC"));
    }

    #[tokio::test]
    async fn manual_stop_credits_ledger() {
        let (engine, books, _, _) = engine(vec![discovered("BTC", vec![])], dec!(10000));
        book(&books, "BTC-PERP", dec!(101), dec!(101.5));
        book(&books, "BTC/USD", dec!(99.9), dec!(100));
        engine.pairs[0].lock().await.ingest_next_rate(dec!(0.001), dec!(5));
        engine.run_signal_cycle().await;
        assert_eq!(engine.free_balance().await, dec!(8000));

        let credit = engine.stop_pair(PairId(0), StopReason::FundingNotProfitable).await.unwrap();

        assert_eq!(credit, Some(dec!(2000)));
        assert_eq!(engine.free_balance().await, dec!(10000));
        assert!(!engine.pair(PairId(0)).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn snapshot_lists_open_pairs_only() {
        let (engine, books, _, _) =
            engine(vec![discovered("BTC", vec![]), discovered("ETH", vec![])], dec!(10000));
        book(&books, "BTC-PERP", dec!(101), dec!(101.5));
        book(&books, "BTC/USD", dec!(99.9), dec!(100));
        engine.pairs[0].lock().await.ingest_next_rate(dec!(0.001), dec!(5));
        engine.run_signal_cycle().await;

        let status = engine.snapshot().await;

        assert_eq!(status.tracked_pairs, 2);
        assert_eq!(status.open_pairs, 1);
        assert_eq!(status.pairs[0].name, "BTC");
        assert_eq!(status.free_balance, dec!(8000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_keep_ledger_consistent() {
        let (engine, books, exchange, _) =
            engine(vec![discovered("BTC", vec![]), discovered("ETH", vec![])], dec!(10000));
        for base in ["BTC", "ETH"] {
            book(&books, &format!("{base}-PERP"), dec!(101), dec!(101.5));
            book(&books, &format!("{base}/USD"), dec!(99.9), dec!(100));
            exchange.set_next_rate(&format!("{base}-PERP"), dec!(0.001));
        }
        engine.poll_next_rates().await;

        for round in 0..8 {
            let (_, _, _, stopped) = tokio::join!(
                engine.run_signal_cycle(),
                engine.refresh_funding(),
                engine.run_signal_cycle(),
                engine.stop_pair(PairId(round % 2), StopReason::FundingNotProfitable),
            );
            stopped.unwrap();

            let mut committed = Decimal::ZERO;
            for id in 0..engine.pair_count() {
                let pair = engine.pair(PairId(id)).await.unwrap();
                committed += pair.size.abs() / dec!(5) * Decimal::TWO;
                if pair.is_open() {
                    assert!(pair.perp_enter_price > Decimal::ZERO);
                    assert!(pair.hedge_enter_price > Decimal::ZERO);
                } else {
                    assert_eq!(pair.perp_enter_price, Decimal::ZERO);
                    assert_eq!(pair.hedge_enter_price, Decimal::ZERO);
                }
            }
            assert_eq!(engine.free_balance().await + committed, dec!(10000), "round {round}");
        }
    }
}
