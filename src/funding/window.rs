//! Rolling window of hourly funding rates.
//!
//! Rates are stored newest first. `window[0]` is the upcoming (next) rate once
//! the hourly refresh has run, `window[1]` is the rate that was just paid.

use std::collections::VecDeque;

use rust_decimal::Decimal;

/// Hourly funding intervals in a 365 day year.
pub const HOURS_PER_YEAR: u32 = 365 * 24;

/// Annualised rate earned by a hedged pair: `|rate| * 8760 * leverage / 2`.
///
/// Half the leverage goes to each leg, so only half the notional earns funding.
pub fn funding_rate_to_apr(rate: Decimal, leverage: Decimal) -> Decimal {
    rate.abs() * Decimal::from(HOURS_PER_YEAR) * leverage / Decimal::TWO
}

/// Bounded funding-rate history for one perpetual market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingWindow {
    rates: VecDeque<Decimal>,
    capacity: usize,
}

impl FundingWindow {
    /// Empty window holding at most `capacity` rates.
    pub fn new(capacity: usize) -> Self {
        Self {
            rates: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from exchange history, which arrives oldest first.
    ///
    /// Only the newest `capacity` rates are kept.
    pub fn from_chronological(rates: Vec<Decimal>, capacity: usize) -> Self {
        let rates: VecDeque<Decimal> = rates.into_iter().rev().take(capacity).collect();
        Self { rates, capacity }
    }

    /// Prepend the upcoming rate, dropping the oldest beyond capacity.
    pub fn ingest_next_rate(&mut self, rate: Decimal) {
        if self.capacity == 0 {
            return;
        }
        self.rates.push_front(rate);
        self.rates.truncate(self.capacity);
    }

    /// Number of stored rates.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// True when no rate is stored.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Maximum number of stored rates.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent rate.
    pub fn latest(&self) -> Option<Decimal> {
        self.rates.front().copied()
    }

    /// Rate most recently paid, i.e. the second entry.
    pub fn latest_settled(&self) -> Option<Decimal> {
        self.rates.get(1).copied()
    }

    /// Rates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Decimal> {
        self.rates.iter()
    }

    /// How many leading rates share the sign of the newest one.
    ///
    /// The newest rate always counts once. Following rates count while their
    /// product with it is strictly positive, so a zero newest rate counts 1.
    pub fn consecutive_sign_count(&self) -> usize {
        let Some(first) = self.latest() else {
            return 0;
        };
        1 + self
            .rates
            .iter()
            .skip(1)
            .take_while(|rate| **rate * first > Decimal::ZERO)
            .count()
    }

    /// Trailing average funding annualised: `|sum| * (8760 / len) * leverage / 2`.
    pub fn average_annualized_rate(&self, leverage: Decimal) -> Decimal {
        if self.rates.is_empty() {
            return Decimal::ZERO;
        }
        let total: Decimal = self.rates.iter().sum();
        let to_annual = Decimal::from(HOURS_PER_YEAR) / Decimal::from(self.rates.len());
        total.abs() * to_annual * leverage / Decimal::TWO
    }
}
