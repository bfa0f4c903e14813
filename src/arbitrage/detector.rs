//! Per-pair signal evaluation.

use rust_decimal::Decimal;
use strum::Display;

use super::calculator::{current_next_apr, enter_spread, inner_spread, outer_spread, LegQuotes};
use super::pair::TrackedPair;
use crate::config::StrategyParams;
use crate::error::OrderBookError;
use crate::funding::funding_rate_to_apr;

/// Why an open pair is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StopReason {
    /// Exiting both legs costs no more than the stop spread.
    #[strum(to_string = "outer spread smaller than threshold")]
    OuterSpread,
    /// The position now pays funding.
    #[strum(to_string = "funding rate not profitable")]
    FundingNotProfitable,
}

impl StopReason {
    /// Reason reported for a stop, given whether the exit spread has closed.
    pub fn classify(spread_closed: bool) -> Self {
        if spread_closed {
            StopReason::OuterSpread
        } else {
            StopReason::FundingNotProfitable
        }
    }

    /// Short label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            StopReason::OuterSpread => "outer_spread",
            StopReason::FundingNotProfitable => "funding",
        }
    }
}

/// Decision for one pair in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing to do.
    Hold,
    /// Close the open position.
    Stop(StopReason),
    /// Open a new position.
    Start,
    /// Grow the open position.
    Increase,
}

/// Signal plus the numbers that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Resulting decision.
    pub signal: Signal,
    /// APR of the next rate, unsigned.
    pub next_apr: Decimal,
    /// Entry premium, when computed.
    pub inner_spread: Option<Decimal>,
    /// Exit cost, when computed.
    pub outer_spread: Option<Decimal>,
}

/// Stop check for an open pair. `None` keeps the position.
pub fn evaluate_stop(
    pair: &TrackedPair,
    quotes: &LegQuotes,
    params: &StrategyParams,
) -> Result<(Option<StopReason>, Decimal), OrderBookError> {
    let (high, low) = quotes.high_low(pair.next_funding_rate);
    let outer = outer_spread(high, low)?;
    if !pair.is_open() {
        return Ok((None, outer));
    }

    let current_apr = current_next_apr(pair.size, pair.next_funding_rate, params.leverage);
    let spread_closed = outer <= params.stop_future_spot_spread_rate;
    let should_stop = current_apr < params.stop_apr_threshold && spread_closed;
    Ok((should_stop.then(|| StopReason::classify(spread_closed)), outer))
}

/// Start or increase check. Returns `Hold` when neither applies.
pub fn evaluate_entry(
    pair: &TrackedPair,
    quotes: &LegQuotes,
    params: &StrategyParams,
) -> Result<(Signal, Decimal), OrderBookError> {
    let (high, low) = quotes.high_low(pair.next_funding_rate);
    let inner = inner_spread(high, low)?;
    let apr = funding_rate_to_apr(pair.next_funding_rate, params.leverage);
    let can_perfect_leverage =
        pair.next_funding_rate < Decimal::ZERO || pair.spec.is_collateral_efficient;
    let apr_ok = apr >= params.start_apr_threshold && can_perfect_leverage;

    if !pair.is_open() {
        if apr_ok && inner >= params.start_future_spot_spread_rate {
            return Ok((Signal::Start, inner));
        }
        return Ok((Signal::Hold, inner));
    }

    let entered = enter_spread(pair.perp_enter_price, pair.hedge_enter_price);
    if apr_ok && inner - entered >= params.increase_size_threshold {
        return Ok((Signal::Increase, inner));
    }
    Ok((Signal::Hold, inner))
}

/// Full evaluation: an open pair is checked for stop first, and a stopping
/// pair is not considered for entry in the same cycle.
pub fn evaluate(
    pair: &TrackedPair,
    quotes: &LegQuotes,
    params: &StrategyParams,
) -> Result<Evaluation, OrderBookError> {
    let next_apr = funding_rate_to_apr(pair.next_funding_rate, params.leverage);

    let mut outer = None;
    if pair.is_open() {
        let (reason, spread) = evaluate_stop(pair, quotes, params)?;
        outer = Some(spread);
        if let Some(reason) = reason {
            return Ok(Evaluation {
                signal: Signal::Stop(reason),
                next_apr,
                inner_spread: None,
                outer_spread: outer,
            });
        }
    }

    let (signal, inner) = evaluate_entry(pair, quotes, params)?;
    Ok(Evaluation {
        signal,
        next_apr,
        inner_spread: Some(inner),
        outer_spread: outer,
    })
}
