//! Market-related types for perpetual, quarterly and spot markets.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Exchange market category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarketType {
    /// Perpetual or dated future.
    Future,
    /// Spot market.
    Spot,
    /// Anything else the exchange lists.
    #[serde(other)]
    Other,
}

/// One row of the exchange market listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketInfo {
    /// Market name (e.g. `BTC-PERP`, `BTC-0326`, `BTC/USD`).
    pub name: String,
    /// Market category.
    #[serde(rename = "type")]
    pub market_type: MarketType,
}

/// Market names grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketList {
    /// Perpetual contracts (`*-PERP`).
    pub perpetuals: Vec<String>,
    /// Dated futures.
    pub quarterlies: Vec<String>,
    /// Spot markets.
    pub spots: Vec<String>,
}

impl MarketList {
    /// Suffix that marks a perpetual future.
    pub const PERP_SUFFIX: &'static str = "-PERP";

    /// Split a raw listing into perpetuals, quarterlies and spots.
    pub fn from_markets(markets: impl IntoIterator<Item = MarketInfo>) -> Self {
        let mut list = Self::default();
        for market in markets {
            match market.market_type {
                MarketType::Future if market.name.contains(Self::PERP_SUFFIX) => {
                    list.perpetuals.push(market.name)
                }
                MarketType::Future => list.quarterlies.push(market.name),
                MarketType::Spot => list.spots.push(market.name),
                MarketType::Other => {}
            }
        }
        list
    }
}

/// Statistics for a perpetual's upcoming funding payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingStats {
    /// Predicted rate for the next funding interval.
    pub next_funding_rate: Decimal,
    /// When the next payment settles.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_funding_time: Option<OffsetDateTime>,
}

impl FundingStats {
    /// Stats carrying only a rate.
    pub fn new(next_funding_rate: Decimal) -> Self {
        Self {
            next_funding_rate,
            next_funding_time: None,
        }
    }
}

/// A hedged pair found on the exchange, before any state is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairSpec {
    /// Base asset (e.g. `BTC`).
    pub base: String,
    /// Perpetual market name.
    pub perp_market: String,
    /// Market used as the hedge leg.
    pub hedge_market: String,
    /// Spot market, when listed.
    pub spot_market: Option<String>,
    /// Quarterly future, when listed.
    pub quarter_market: Option<String>,
    /// Whether the hedge leg counts toward margin collateral.
    pub is_collateral_efficient: bool,
}

impl PairSpec {
    /// Pair hedged with the spot market.
    pub fn spot_hedged(base: impl Into<String>, is_collateral_efficient: bool) -> Self {
        let base = base.into();
        let spot = format!("{base}/USD");
        Self {
            perp_market: format!("{base}{}", MarketList::PERP_SUFFIX),
            hedge_market: spot.clone(),
            spot_market: Some(spot),
            quarter_market: None,
            is_collateral_efficient,
            base,
        }
    }

    /// Markets the feed must subscribe to for this pair.
    pub fn required_markets(&self) -> Vec<String> {
        let mut markets = vec![self.perp_market.clone(), self.hedge_market.clone()];
        markets.dedup();
        markets
    }
}
