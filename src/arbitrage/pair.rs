//! Per-pair state: identity, funding statistics and the simulated position.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::funding::{funding_rate_to_apr, FundingWindow};
use crate::market::PairSpec;

/// Stable index of a pair in the engine registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairId(pub usize);

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction of the perp leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    /// No position.
    Flat,
    /// Long perp, short hedge.
    LongPerp,
    /// Short perp, long hedge.
    ShortPerp,
}

impl PositionSide {
    /// Side implied by a signed size.
    pub fn of(size: Decimal) -> Self {
        if size > Decimal::ZERO {
            PositionSide::LongPerp
        } else if size < Decimal::ZERO {
            PositionSide::ShortPerp
        } else {
            PositionSide::Flat
        }
    }

    /// Side a new position takes: short perp when longs pay (`rate > 0`).
    pub fn for_rate(next_funding_rate: Decimal) -> Self {
        if next_funding_rate > Decimal::ZERO {
            PositionSide::ShortPerp
        } else {
            PositionSide::LongPerp
        }
    }

    /// +1, -1 or 0.
    pub fn sign(self) -> Decimal {
        match self {
            PositionSide::LongPerp => Decimal::ONE,
            PositionSide::ShortPerp => Decimal::NEGATIVE_ONE,
            PositionSide::Flat => Decimal::ZERO,
        }
    }
}

/// One hedged perp/spot (or perp/quarter) opportunity.
#[derive(Debug, Clone)]
pub struct TrackedPair {
    /// Registry index.
    pub id: PairId,
    /// Markets making up the pair.
    pub spec: PairSpec,
    /// Hourly funding history, newest first.
    pub funding: FundingWindow,
    /// Predicted rate for the coming hour.
    pub next_funding_rate: Decimal,
    /// Leading rates sharing the newest rate's sign.
    pub consecutive_sign_count: usize,
    /// Trailing average funding, annualised.
    pub average_annualized_rate: Decimal,
    /// Signed perp size: positive long perp, negative short perp.
    pub size: Decimal,
    /// Blended perp entry price.
    pub perp_enter_price: Decimal,
    /// Blended hedge entry price.
    pub hedge_enter_price: Decimal,
    /// Fees, funding and realised hedge profit since startup.
    pub total_profit: Decimal,
    /// Unrealised profit of the two legs at the last mark.
    pub current_hedge_profit: Decimal,
    /// Funding earned in the last settled hour.
    pub hourly_funding_rate_profit: Decimal,
    /// Opened during the current hour, so not owed this hour's funding.
    pub opened_this_hour: bool,
}

impl TrackedPair {
    /// New flat pair. Funding statistics are derived from `history`.
    pub fn new(id: PairId, spec: PairSpec, history: FundingWindow, leverage: Decimal) -> Self {
        let mut pair = Self {
            id,
            spec,
            funding: history,
            next_funding_rate: Decimal::ZERO,
            consecutive_sign_count: 0,
            average_annualized_rate: Decimal::ZERO,
            size: Decimal::ZERO,
            perp_enter_price: Decimal::ZERO,
            hedge_enter_price: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            current_hedge_profit: Decimal::ZERO,
            hourly_funding_rate_profit: Decimal::ZERO,
            opened_this_hour: false,
        };
        pair.recompute_funding_stats(leverage);
        pair
    }

    /// Base asset name.
    pub fn name(&self) -> &str {
        &self.spec.base
    }

    /// True while holding a position.
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    /// Current perp direction.
    pub fn side(&self) -> PositionSide {
        PositionSide::of(self.size)
    }

    /// APR of the predicted next rate.
    pub fn next_apr(&self, leverage: Decimal) -> Decimal {
        funding_rate_to_apr(self.next_funding_rate, leverage)
    }

    /// Record a freshly fetched next rate and push it into the window.
    pub fn ingest_next_rate(&mut self, rate: Decimal, leverage: Decimal) {
        self.next_funding_rate = rate;
        self.funding.ingest_next_rate(rate);
        self.recompute_funding_stats(leverage);
    }

    /// Refresh the derived window statistics.
    pub fn recompute_funding_stats(&mut self, leverage: Decimal) {
        self.consecutive_sign_count = self.funding.consecutive_sign_count();
        self.average_annualized_rate = self.funding.average_annualized_rate(leverage);
    }

    /// Open a position of `size` notional on `side`.
    ///
    /// Charges the fee on both legs and marks the pair as opened this hour.
    pub fn apply_start(
        &mut self,
        side: PositionSide,
        size: Decimal,
        perp_price: Decimal,
        hedge_price: Decimal,
        fee_rate: Decimal,
    ) {
        self.size = side.sign() * size;
        self.perp_enter_price = perp_price;
        self.hedge_enter_price = hedge_price;
        self.total_profit -= self.size.abs() * fee_rate * Decimal::TWO;
        self.opened_this_hour = true;
    }

    /// Add `delta` notional, blending the entry prices.
    ///
    /// The side follows the current rate, so the absolute size always grows
    /// by `delta`. Fees are charged on `delta` only.
    pub fn apply_increase(
        &mut self,
        side: PositionSide,
        delta: Decimal,
        perp_price: Decimal,
        hedge_price: Decimal,
        fee_rate: Decimal,
    ) {
        let old_abs = self.size.abs();
        let new_abs = old_abs + delta;
        if new_abs.is_zero() {
            return;
        }
        self.perp_enter_price = (old_abs * self.perp_enter_price + delta * perp_price) / new_abs;
        self.hedge_enter_price = (old_abs * self.hedge_enter_price + delta * hedge_price) / new_abs;
        self.size = side.sign() * new_abs;
        self.total_profit -= delta * fee_rate * Decimal::TWO;
    }

    /// Close the position at `hedge_profit` and reset.
    ///
    /// The last settled funding is booked first, unless the pair was opened
    /// this hour. Returns the capital released back to the ledger.
    pub fn apply_stop(&mut self, hedge_profit: Decimal, fee_rate: Decimal, leverage: Decimal) -> Decimal {
        let abs_size = self.size.abs();
        self.total_profit -= abs_size * fee_rate * Decimal::TWO;
        if !self.opened_this_hour {
            if let Some(settled) = self.funding.latest_settled() {
                self.apply_hourly_profit(settled, hedge_profit);
            }
        }
        self.current_hedge_profit = hedge_profit;
        self.total_profit += self.current_hedge_profit;

        self.size = Decimal::ZERO;
        self.perp_enter_price = Decimal::ZERO;
        self.hedge_enter_price = Decimal::ZERO;
        self.current_hedge_profit = Decimal::ZERO;
        self.hourly_funding_rate_profit = Decimal::ZERO;

        abs_size / leverage * Decimal::TWO
    }

    /// Book one settled funding payment and re-mark the legs.
    ///
    /// Paying funding is negative: a long perp pays a positive rate.
    pub fn apply_hourly_profit(&mut self, settled_rate: Decimal, hedge_profit: Decimal) -> Decimal {
        let hourly = self.size * settled_rate * Decimal::NEGATIVE_ONE;
        self.hourly_funding_rate_profit = hourly;
        self.total_profit += hourly;
        self.current_hedge_profit = hedge_profit;
        hourly
    }
}
