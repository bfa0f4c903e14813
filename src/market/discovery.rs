//! Pair discovery: turn the exchange listing into hedged pairs.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use super::client::ExchangeClient;
use super::types::{MarketList, PairSpec};
use crate::error::ExchangeError;
use crate::funding::FundingWindow;

/// Collateral weight per asset. Assets listed here count toward margin, so a
/// long spot hedge does not tie up extra capital.
pub static COLLATERAL_WEIGHTS: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    HashMap::from([
        ("USD", dec!(0.98)),
        ("USDT", dec!(0.95)),
        ("BTC", dec!(0.95)),
        ("ETH", dec!(0.9)),
        ("BNB", dec!(0.9)),
        ("PAXG", dec!(0.9)),
        ("XAUT", dec!(0.9)),
        ("KNC", dec!(0.9)),
        ("BCH", dec!(0.85)),
        ("LTC", dec!(0.85)),
        ("TRYB", dec!(0.85)),
        ("LINK", dec!(0.85)),
        ("TRX", dec!(0.85)),
        ("CUSDT", dec!(0.85)),
        ("XRP", dec!(0.85)),
        ("SOL", dec!(0.85)),
        ("BVOL", dec!(0.8)),
        ("IBVOL", dec!(0.8)),
        ("MKR", dec!(0.8)),
        ("SUSHI", dec!(0.8)),
        ("SNX", dec!(0.8)),
        ("YFI", dec!(0.8)),
        ("SXP", dec!(0.8)),
        ("BTMX", dec!(0.8)),
        ("OMG", dec!(0.8)),
        ("TOMO", dec!(0.8)),
        ("AAVE", dec!(0.8)),
        ("OKB", dec!(0.8)),
        ("HT", dec!(0.8)),
        ("MATIC", dec!(0.8)),
        ("LEO", dec!(0.8)),
        ("SRM", dec!(0.85)),
        ("UNI", dec!(0.8)),
        ("MOB", dec!(0.8)),
        ("1INCH", dec!(0.85)),
        ("CEL", dec!(0.8)),
        ("GRT", dec!(0.85)),
        ("RUNE", dec!(0.8)),
        ("RSR", dec!(0.8)),
        ("FIDA", dec!(0.8)),
        ("HXRO", dec!(0.75)),
        ("HOLY", dec!(0.85)),
        ("SECO", dec!(0.85)),
        ("DAI", dec!(0.85)),
        ("DOGE", dec!(0.8)),
        ("FTT", dec!(0.95)),
    ])
});

/// True when `base` counts toward margin collateral.
pub fn is_collateral_efficient(base: &str) -> bool {
    COLLATERAL_WEIGHTS.contains_key(base)
}

/// Inputs that shape discovery.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Suffix identifying the quarterly contract in use (e.g. `0326`).
    pub quarter_contract_name: String,
    /// Base assets never traded.
    pub blacklist: Vec<String>,
    /// Days of funding history to load.
    pub prev_rate_days: u32,
}

impl DiscoverySettings {
    /// Funding window capacity: one rate per hour.
    pub fn window_capacity(&self) -> usize {
        self.prev_rate_days as usize * 24
    }
}

/// A pair with its initial funding history.
#[derive(Debug, Clone)]
pub struct DiscoveredPair {
    /// Markets making up the pair.
    pub spec: PairSpec,
    /// History loaded at startup, newest first.
    pub history: FundingWindow,
}

/// Build pair specs from a listing. Pure, no network.
///
/// A perpetual `BASE-PERP` becomes a pair when `BASE/USD` is listed; the spot
/// market is the hedge. `BASE-<quarter>` is recorded when listed.
pub fn build_pair_specs(list: &MarketList, settings: &DiscoverySettings) -> Vec<PairSpec> {
    let quarters: HashSet<&str> = list
        .quarterlies
        .iter()
        .filter(|name| name.contains(settings.quarter_contract_name.as_str()))
        .map(String::as_str)
        .collect();
    let spots: HashSet<&str> = list
        .spots
        .iter()
        .filter(|name| name.contains("/USD") && !name.contains("/USDT"))
        .map(String::as_str)
        .collect();

    let mut specs = Vec::new();
    for perp in &list.perpetuals {
        let base = perp.split('-').next().unwrap_or(perp.as_str());
        if settings.blacklist.iter().any(|b| b == base) {
            info!(base = %base, "Skipping blacklisted market");
            continue;
        }

        let spot = format!("{base}/USD");
        if !spots.contains(spot.as_str()) {
            info!(base = %base, "No USD spot market, pair cannot be used");
            continue;
        }

        let quarter = format!("{base}-{}", settings.quarter_contract_name);
        specs.push(PairSpec {
            base: base.to_string(),
            perp_market: perp.clone(),
            hedge_market: spot.clone(),
            spot_market: Some(spot),
            quarter_market: quarters.contains(quarter.as_str()).then_some(quarter),
            is_collateral_efficient: is_collateral_efficient(base),
        });
    }
    specs
}

/// History range: `prev_rate_days` ending at the last full hour before `now`.
pub fn history_range(now: OffsetDateTime, prev_rate_days: u32) -> (OffsetDateTime, OffsetDateTime) {
    let ts = now.unix_timestamp();
    let end_ts = ts - ts.rem_euclid(3600);
    let end = OffsetDateTime::from_unix_timestamp(end_ts).unwrap_or(now);
    let start = end - Duration::days(i64::from(prev_rate_days));
    (start, end)
}

/// Enumerate exchange markets and load each pair's funding history.
///
/// A failed listing is an error. A failed history fetch leaves that pair's
/// window empty.
#[instrument(skip(client, settings))]
pub async fn discover_pairs(
    client: &dyn ExchangeClient,
    settings: &DiscoverySettings,
    now: OffsetDateTime,
) -> Result<Vec<DiscoveredPair>, ExchangeError> {
    let list = client.fetch_market_list().await?;
    let specs = build_pair_specs(&list, settings);
    let (start, end) = history_range(now, settings.prev_rate_days);
    let capacity = settings.window_capacity();

    let mut pairs = Vec::with_capacity(specs.len());
    for spec in specs {
        let history = match client
            .fetch_funding_rate_history(&spec.perp_market, start, end)
            .await
        {
            Ok(rates) => FundingWindow::from_chronological(rates, capacity),
            Err(e) => {
                warn!(market = %spec.perp_market, error = %e, "Failed to load funding history");
                FundingWindow::new(capacity)
            }
        };
        pairs.push(DiscoveredPair { spec, history });
    }

    info!(pairs = pairs.len(), "Discovered tradable pairs");
    Ok(pairs)
}
