//! Funding-rate arbitrage engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funding_arb::api::{create_router, AppState};
use funding_arb::arbitrage::{ArbitrageEngine, EngineSettings};
use funding_arb::config::{Config, Mode};
use funding_arb::market::{discover_pairs, ExchangeClient, RestExchangeClient};
use funding_arb::metrics;
use funding_arb::notify::{self, notify_owner, Notifier};
use funding_arb::orderbook::{MarketWebSocket, OrderBookStore};
use funding_arb::schedule::{run_periodic, Clock, Schedule, SystemClock};
use funding_arb::utils::cancel_on_shutdown;

/// Funding-rate arbitrage engine for perpetual futures.
#[derive(Parser, Debug)]
#[command(name = "funding-arb")]
#[command(about = "Hedged funding-rate arbitrage on perpetual futures")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run,

    /// Check configuration validity.
    CheckConfig,

    /// Discover tradable pairs and print their funding statistics.
    ListPairs,

    /// Stream order books for a few markets (diagnostic).
    WsTest {
        /// Markets to subscribe to.
        #[arg(short, long, default_values_t = ["BTC-PERP".to_string(), "BTC/USD".to_string()])]
        market: Vec<String>,

        /// Seconds to listen.
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("funding_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(fmt::layer))
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::ListPairs) => cmd_list_pairs().await,
        Some(Command::WsTest { market, seconds }) => cmd_ws_test(market, seconds).await,
        Some(Command::Run) | None => cmd_run().await,
    }
}

/// Load and validate configuration, logging the failure.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }
    Ok(config)
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("FUNDING ARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Owner: {}", config.bot_owner);
    println!("  Mode: {}", config.mode);
    println!("  Strategy: {}", config.strategy);
    println!("  Leverage: {}x", config.leverage);
    println!("  Start APR: {}  Stop APR: {}", config.start_apr_threshold, config.stop_apr_threshold);
    println!(
        "  Start spread: {}  Stop spread: {}  Increase: {}",
        config.start_future_spot_spread_rate,
        config.stop_future_spot_spread_rate,
        config.increase_size_threshold
    );
    println!(
        "  Free balance: {} (allocate {} per batch, min {} per pair)",
        config.initial_free_balance, config.free_balance_allocate_rate, config.min_amount
    );
    println!("  History: {} days", config.prev_rate_days);
    println!("  Quarter contract: {}", config.quarter_contract_name);
    println!("  Blacklist: {:?}", config.blacklist());
    println!("  Exchange: {} / {}", config.exchange_rest_url, config.exchange_ws_url);
    println!(
        "  Notifications: {}",
        if config.telegram_token.is_some() { "Telegram" } else { "log" }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Discover pairs and print their funding statistics.
async fn cmd_list_pairs() -> anyhow::Result<()> {
    let config = load_config()?;
    let client = RestExchangeClient::new(&config)?;

    println!("Discovering pairs...");
    let pairs = discover_pairs(&client, &config.discovery_settings(), OffsetDateTime::now_utc()).await?;
    let leverage = config.leverage;

    println!("{:<10} {:<14} {:<12} {:>6} {:>10} {:>12}", "BASE", "PERP", "HEDGE", "HOURS", "CONS", "AVG APR %");
    for pair in &pairs {
        println!(
            "{:<10} {:<14} {:<12} {:>6} {:>10} {:>12.2}{}",
            pair.spec.base,
            pair.spec.perp_market,
            pair.spec.hedge_market,
            pair.history.len(),
            pair.history.consecutive_sign_count(),
            pair.history.average_annualized_rate(leverage) * rust_decimal::Decimal::ONE_HUNDRED,
            if pair.spec.is_collateral_efficient { "" } else { "  (not collateral)" }
        );
    }
    println!("{} pairs", pairs.len());
    Ok(())
}

/// Stream order books for `markets` and print top of book.
async fn cmd_ws_test(markets: Vec<String>, seconds: u64) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("FUNDING ARB - WEBSOCKET TEST");
    println!("======================================================================");

    let config = load_config()?;
    let store = Arc::new(OrderBookStore::new());
    let ws = Arc::new(MarketWebSocket::with_reconnect_config(
        config.exchange_ws_url.clone(),
        store.clone(),
        config.reconnect_config(),
    ));
    let cancel = CancellationToken::new();

    println!("\nSubscribing to {:?}...", markets);
    let (mut updates, handle) = ws.clone().spawn(markets, cancel.clone());

    let start = Instant::now();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut message_count = 0u32;

    loop {
        tokio::select! {
            Some(update) = updates.recv() => {
                message_count += 1;
                match store.quote(&update.market) {
                    Ok(q) => println!(
                        "   [{:.1}s] {} {:?}: bid {:?} ask {:?}",
                        start.elapsed().as_secs_f64(), update.market, update.kind, q.best_bid, q.best_ask
                    ),
                    Err(e) => println!("   [{:.1}s] {}: {}", start.elapsed().as_secs_f64(), update.market, e),
                }
            }
            _ = &mut deadline => break,
        }
    }

    cancel.cancel();
    let _ = handle.await;

    println!("\n======================================================================");
    println!("WEBSOCKET TEST COMPLETE");
    println!("  Messages received: {}", message_count);
    println!("  Books held: {}", store.len());
    println!("  Reconnects: {}", ws.reconnect_attempts());
    println!("======================================================================");

    Ok(())
}

/// Run the engine until Ctrl-C or SIGTERM.
async fn cmd_run() -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;

    info!("Configuration loaded successfully");
    info!("Mode: {}", config.mode);
    info!("Strategy: {}", config.strategy);
    info!("Leverage: {}x", config.leverage);
    if config.mode == Mode::Trade {
        warn!("Trade mode: positions are still tracked as simulated book entries");
    }

    metrics::install_prometheus_exporter(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)));

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    // Discover pairs and load their funding history
    let exchange: Arc<dyn ExchangeClient> = Arc::new(RestExchangeClient::new(&config)?);
    let notifier: Arc<dyn Notifier> = Arc::from(notify::from_config(&config)?);
    let pairs = discover_pairs(exchange.as_ref(), &config.discovery_settings(), OffsetDateTime::now_utc()).await?;
    if pairs.is_empty() {
        warn!("No tradable pairs discovered");
    }

    let books = Arc::new(OrderBookStore::new());
    let engine = Arc::new(ArbitrageEngine::new(
        pairs,
        books.clone(),
        exchange,
        notifier.clone(),
        EngineSettings::from_config(&config),
    ));
    info!(
        pairs = engine.pair_count(),
        markets = engine.required_markets().len(),
        "Engine initialised"
    );

    // Start HTTP server
    let app_state = AppState::new(engine.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(server_cancel.cancelled_owned())
            .await
        {
            error!("HTTP server failed: {}", e);
        }
    });

    // Market data feed
    let ws = Arc::new(MarketWebSocket::with_reconnect_config(
        config.exchange_ws_url.clone(),
        books,
        config.reconnect_config(),
    ));
    let (mut updates, feed_handle) = ws.clone().spawn(engine.required_markets().to_vec(), cancel.clone());
    let ready_state = app_state.clone();
    let drain_handle = tokio::spawn(async move {
        let mut check = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(update) = update else { break };
                    if !ready_state.is_ready() && ws.is_connected() {
                        info!(market = %update.market, "Book received, engine ready");
                        ready_state.set_ready(true);
                    }
                    debug!(market = %update.market, kind = ?update.kind, "Book updated");
                }
                _ = check.tick() => {
                    if ready_state.is_ready() && !ws.is_connected() {
                        warn!("Market data feed disconnected");
                        ready_state.set_ready(false);
                    }
                }
            }
        }
        ready_state.set_ready(false);
    });

    // Periodic jobs
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut handles: Vec<JoinHandle<()>> = vec![server_handle, feed_handle, drain_handle];

    let e = engine.clone();
    handles.push(tokio::spawn(run_periodic(
        "signal",
        Schedule::Every(Duration::from_millis(config.signal_interval_ms)),
        clock.clone(),
        cancel.clone(),
        move || {
            let engine = e.clone();
            async move {
                engine.run_signal_cycle().await;
                Ok(())
            }
        },
    )));

    let e = engine.clone();
    handles.push(tokio::spawn(run_periodic(
        "funding_refresh",
        Schedule::HourlyBefore(Duration::from_secs(config.funding_refresh_offset_s)),
        clock.clone(),
        cancel.clone(),
        move || {
            let engine = e.clone();
            async move {
                engine.refresh_funding().await;
                Ok(())
            }
        },
    )));

    let e = engine.clone();
    handles.push(tokio::spawn(run_periodic(
        "next_rate_poll",
        Schedule::HalfHourGated(Duration::from_secs(config.next_rate_poll_s)),
        clock.clone(),
        cancel.clone(),
        move || {
            let engine = e.clone();
            async move {
                engine.poll_next_rates().await;
                Ok(())
            }
        },
    )));

    let e = engine.clone();
    handles.push(tokio::spawn(run_periodic(
        "report",
        Schedule::Every(Duration::from_secs(config.report_interval_s)),
        clock,
        cancel.clone(),
        move || {
            let engine = e.clone();
            async move {
                engine.send_reports().await;
                Ok(())
            }
        },
    )));

    info!("========================================");
    info!("FUNDING ARBITRAGE ENGINE STARTED");
    info!("========================================");
    notify_owner(
        notifier.as_ref(),
        &config.bot_owner,
        &format!("funding arbitrage started, tracking {} pairs", engine.pair_count()),
    )
    .await;

    cancel.cancelled().await;
    info!("Shutting down...");
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Task ended abnormally: {}", e);
        }
    }

    let status = engine.snapshot().await;
    info!("========================================");
    info!("FINAL SUMMARY");
    info!("========================================");
    for line in status.roi.to_string().lines() {
        info!("{}", line);
    }
    info!("Open pairs: {}", status.open_pairs);
    Ok(())
}
