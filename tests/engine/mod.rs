//! End-to-end tests for the arbitrage engine against an in-memory exchange
//! and order book.
//!
//! The live discovery test is ignored by default and talks to the exchange
//! configured in the environment.
//! Run with: cargo test --test engine -- --ignored

use std::sync::Arc;

use funding_arb::arbitrage::{ArbitrageEngine, EngineSettings, PairId, PositionSide, StopReason};
use funding_arb::config::{StrategyKind, StrategyParams};
use funding_arb::funding::FundingWindow;
use funding_arb::market::{
    discover_pairs, DiscoveredPair, DiscoverySettings, MarketInfo, MarketList, MarketType,
    MockExchangeClient, PairSpec,
};
use funding_arb::notify::RecordingNotifier;
use funding_arb::orderbook::{OrderBookStore, PriceLevel};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::macros::datetime;

struct Harness {
    engine: ArbitrageEngine,
    books: Arc<OrderBookStore>,
    exchange: Arc<MockExchangeClient>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(pairs: Vec<DiscoveredPair>, params: StrategyParams, free: Decimal) -> Harness {
    let books = Arc::new(OrderBookStore::new());
    let exchange = Arc::new(MockExchangeClient::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = ArbitrageEngine::new(
        pairs,
        books.clone(),
        exchange.clone(),
        notifier.clone(),
        EngineSettings {
            owner: "desk".to_string(),
            params,
            init_balance: dec!(10000),
            initial_free_balance: free,
        },
    );
    Harness {
        engine,
        books,
        exchange,
        notifier,
    }
}

fn spot_pair(base: &str, collateral: bool) -> DiscoveredPair {
    DiscoveredPair {
        spec: PairSpec::spot_hedged(base, collateral),
        history: FundingWindow::from_chronological(vec![dec!(0.0008), dec!(0.0009)], 168),
    }
}

fn set_book(store: &OrderBookStore, market: &str, bid: Decimal, ask: Decimal) {
    store.apply_snapshot(
        market,
        vec![PriceLevel::new(bid, dec!(5))],
        vec![PriceLevel::new(ask, dec!(5))],
    );
}

/// Perp trading 1% over spot: inner spread for a short perp is 0.01.
fn premium_books(store: &OrderBookStore) {
    set_book(store, "BTC-PERP", dec!(101), dec!(101.5));
    set_book(store, "BTC/USD", dec!(99.5), dec!(100));
}

async fn open_btc(h: &Harness) {
    h.exchange.set_next_rate("BTC-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    premium_books(&h.books);
    let summary = h.engine.run_signal_cycle().await;
    assert_eq!(summary.started, 1);
}

#[tokio::test]
async fn high_positive_rate_opens_short_perp() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    h.exchange.set_next_rate("BTC-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    premium_books(&h.books);

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.started, 1);
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    assert_eq!(pair.side(), PositionSide::ShortPerp);
    assert_eq!(pair.next_apr(dec!(5)), dec!(21.9));
    // 10000 * 0.2 allocated, half per leg at 5x
    assert_eq!(pair.size, dec!(-5000));
    assert_eq!(pair.perp_enter_price, dec!(101));
    assert_eq!(pair.hedge_enter_price, dec!(100));
    assert_eq!(pair.total_profit, dec!(-7));
    assert_eq!(h.engine.free_balance().await, dec!(8000));

    let messages = h.notifier.messages();
    assert_eq!(messages[0], "start earning on BTC, size -5000.00");
    assert!(messages[1].starts_with("profitable: BTC\n"));
    assert!(messages[1].ends_with("increase: false"));
}

#[tokio::test]
async fn closing_spread_and_flipped_rate_stop_the_pair() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;

    h.exchange.set_next_rate("BTC-PERP", dec!(-0.0005));
    h.engine.poll_next_rates().await;
    set_book(&h.books, "BTC-PERP", dec!(100), dec!(100.2));
    set_book(&h.books, "BTC/USD", dec!(99.8), dec!(100));

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.stopped, 1);
    assert_eq!(summary.started, 0);
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    assert!(!pair.is_open());
    assert_eq!(pair.perp_enter_price, Decimal::ZERO);
    // 5000 / 5 * 2 released
    assert_eq!(h.engine.free_balance().await, dec!(10000));
    assert!(h
        .notifier
        .messages()
        .iter()
        .any(|m| m.contains("stop reason: outer spread smaller than threshold")));
}

#[tokio::test]
async fn open_pair_with_wide_spread_is_held() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;

    h.exchange.set_next_rate("BTC-PERP", dec!(-0.0005));
    h.engine.poll_next_rates().await;
    // perp now under spot: unwinding the short would still lose
    set_book(&h.books, "BTC-PERP", dec!(98), dec!(98.5));

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.stopped, 0);
    assert_eq!(summary.increased, 0);
    assert!(h.engine.pair(PairId(0)).await.unwrap().is_open());
}

#[tokio::test]
async fn manual_stop_releases_capital() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;

    let credit = h
        .engine
        .stop_pair(PairId(0), StopReason::FundingNotProfitable)
        .await
        .unwrap();

    assert_eq!(credit, Some(dec!(2000)));
    assert_eq!(h.engine.free_balance().await, dec!(10000));
    assert_eq!(
        h.engine.stop_pair(PairId(0), StopReason::FundingNotProfitable).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn insufficient_capital_skips_the_batch() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(40));
    h.exchange.set_next_rate("BTC-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    premium_books(&h.books);

    let summary = h.engine.run_signal_cycle().await;

    assert!(summary.allocation_skipped);
    assert_eq!(summary.started, 0);
    assert!(!h.engine.pair(PairId(0)).await.unwrap().is_open());
    assert_eq!(h.engine.free_balance().await, dec!(40));
}

#[tokio::test]
async fn non_collateral_pair_does_not_short_the_perp() {
    let pair = DiscoveredPair {
        spec: PairSpec::spot_hedged("ZZZ", false),
        history: FundingWindow::new(168),
    };
    let h = harness(vec![pair], StrategyParams::default(), dec!(10000));
    h.exchange.set_next_rate("ZZZ-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    set_book(&h.books, "ZZZ-PERP", dec!(101), dec!(101.5));
    set_book(&h.books, "ZZZ/USD", dec!(99.5), dec!(100));

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.started, 0);
}

#[tokio::test]
async fn observe_strategy_never_trades() {
    let params = StrategyParams {
        kind: StrategyKind::Observe,
        ..StrategyParams::default()
    };
    let h = harness(vec![spot_pair("BTC", true)], params, dec!(10000));
    h.exchange.set_next_rate("BTC-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    premium_books(&h.books);

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.observed, 1);
    assert_eq!(summary.started, 0);
    assert!(!h.engine.pair(PairId(0)).await.unwrap().is_open());
    assert_eq!(h.engine.free_balance().await, dec!(10000));
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn missing_hedge_book_leaves_pair_untouched() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    h.exchange.set_next_rate("BTC-PERP", dec!(0.001));
    h.engine.poll_next_rates().await;
    set_book(&h.books, "BTC-PERP", dec!(101), dec!(101.5));

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.evaluated, 0);
    assert!(!h.engine.pair(PairId(0)).await.unwrap().is_open());
    assert_eq!(h.engine.free_balance().await, dec!(10000));
}

#[tokio::test]
async fn hourly_refresh_books_funding_after_first_hour() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;

    // Hour the pair was opened in: no funding booked
    let first = h.engine.refresh_funding().await;
    assert_eq!(first.updated, 1);
    assert_eq!(first.accrued, 0);

    let second = h.engine.refresh_funding().await;
    assert_eq!(second.accrued, 1);
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    // short 5000 receives 0.001 settled funding
    assert_eq!(pair.hourly_funding_rate_profit, dec!(5));
    assert!(h
        .notifier
        .messages()
        .contains(&"earned 5.00 USD on BTC".to_string()));
}

#[tokio::test]
async fn failed_refresh_books_no_funding() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;
    h.engine.refresh_funding().await;
    h.engine.refresh_funding().await;
    let before = h.engine.pair(PairId(0)).await.unwrap();
    assert_eq!(before.total_profit, dec!(-2));

    h.exchange.fail_market("BTC-PERP");
    let summary = h.engine.refresh_funding().await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.accrued, 0);
    let after = h.engine.pair(PairId(0)).await.unwrap();
    assert_eq!(after.total_profit, before.total_profit);
    assert_eq!(after.funding.len(), before.funding.len());
}

#[tokio::test]
async fn stop_after_first_hour_books_settled_funding() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;
    let first = h.engine.refresh_funding().await;
    assert_eq!(first.accrued, 0);
    // marks equal to the entry prices: no hedge profit
    set_book(&h.books, "BTC-PERP", dec!(100.5), dec!(101));
    set_book(&h.books, "BTC/USD", dec!(100), dec!(100.5));

    let credit = h
        .engine
        .stop_pair(PairId(0), StopReason::FundingNotProfitable)
        .await
        .unwrap();

    assert_eq!(credit, Some(dec!(2000)));
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    // two fees of 7, short 5000 earns the settled 0.0009
    assert_eq!(pair.total_profit, dec!(-14) + dec!(4.5));
}

#[tokio::test]
async fn wider_spread_increases_open_pair() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    open_btc(&h).await;
    set_book(&h.books, "BTC-PERP", dec!(110), dec!(110.5));

    let summary = h.engine.run_signal_cycle().await;

    assert_eq!(summary.increased, 1);
    assert_eq!(summary.started, 0);
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    // 8000 * 0.2 allocated, half per leg at 5x
    assert_eq!(pair.size, dec!(-9000));
    assert_eq!(pair.perp_enter_price, dec!(105));
    assert_eq!(pair.hedge_enter_price, dec!(100));
    // fee on the 4000 delta only
    assert_eq!(pair.total_profit, dec!(-7) - dec!(5.6));
    assert_eq!(h.engine.free_balance().await, dec!(6400));
    assert!(h
        .notifier
        .messages()
        .contains(&"increase size 4000.00 on BTC".to_string()));
}

#[tokio::test]
async fn hourly_update_is_a_no_op_when_flat() {
    let h = harness(vec![spot_pair("BTC", true)], StrategyParams::default(), dec!(10000));
    premium_books(&h.books);

    assert_eq!(h.engine.update_hourly_profit().await, 0);
    assert_eq!(h.engine.pair(PairId(0)).await.unwrap().total_profit, Decimal::ZERO);
}

#[tokio::test]
async fn snapshot_reports_open_pairs_and_roi() {
    let h = harness(
        vec![spot_pair("BTC", true), spot_pair("ETH", true)],
        StrategyParams::default(),
        dec!(10000),
    );
    open_btc(&h).await;

    let status = h.engine.snapshot().await;

    assert_eq!(status.tracked_pairs, 2);
    assert_eq!(status.open_pairs, 1);
    assert_eq!(status.pairs[0].name, "BTC");
    assert_eq!(status.free_balance, dec!(8000));
    assert_eq!(status.roi.total_profit, dec!(-7));
}

#[tokio::test]
async fn discovered_pairs_feed_the_engine() {
    let exchange = MockExchangeClient::new().with_markets(MarketList::from_markets(vec![
        MarketInfo {
            name: "BTC-PERP".to_string(),
            market_type: MarketType::Future,
        },
        MarketInfo {
            name: "BTC/USD".to_string(),
            market_type: MarketType::Spot,
        },
        MarketInfo {
            name: "ETH-PERP".to_string(),
            market_type: MarketType::Future,
        },
    ]));
    exchange.set_history("BTC-PERP", vec![dec!(0.0001), dec!(0.0002), dec!(0.0003)]);
    let settings = DiscoverySettings {
        quarter_contract_name: "0326".to_string(),
        blacklist: Vec::new(),
        prev_rate_days: 7,
    };

    let discovered = discover_pairs(&exchange, &settings, datetime!(2021-03-01 12:15 UTC))
        .await
        .unwrap();

    assert_eq!(discovered.len(), 1);
    let h = harness(discovered, StrategyParams::default(), dec!(10000));
    assert_eq!(h.engine.required_markets(), &["BTC-PERP", "BTC/USD"]);
    let pair = h.engine.pair(PairId(0)).await.unwrap();
    assert_eq!(pair.consecutive_sign_count, 3);
    assert_eq!(pair.next_funding_rate, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires network access to the configured exchange"]
async fn live_discovery_returns_pairs() {
    dotenvy::dotenv().ok();
    let config = funding_arb::Config::load().unwrap();
    let client = funding_arb::market::RestExchangeClient::new(&config).unwrap();

    let pairs = discover_pairs(&client, &config.discovery_settings(), time::OffsetDateTime::now_utc())
        .await
        .unwrap();

    println!("Discovered {} pairs", pairs.len());
    assert!(pairs.iter().all(|p| p.spec.perp_market.ends_with("-PERP")));
}
