//! Spread, entry price and profit calculations for hedged pairs.

use rust_decimal::Decimal;

use super::pair::PositionSide;
use crate::error::OrderBookError;
use crate::funding::funding_rate_to_apr;
use crate::orderbook::{BookSide, Quote};

/// Top-of-book for both legs of a pair, captured together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegQuotes {
    /// Perpetual leg.
    pub perp: Quote,
    /// Hedge leg (spot or quarter).
    pub hedge: Quote,
}

impl LegQuotes {
    /// Legs ordered as `(high, low)`.
    ///
    /// The perp trades rich to the hedge while longs pay, so it is the high
    /// leg unless the next rate is negative.
    pub fn high_low(&self, next_funding_rate: Decimal) -> (&Quote, &Quote) {
        if next_funding_rate < Decimal::ZERO {
            (&self.hedge, &self.perp)
        } else {
            (&self.perp, &self.hedge)
        }
    }
}

/// Prices at which a new position (or an increase) enters each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPrices {
    /// Perp fill price.
    pub perp: Decimal,
    /// Hedge fill price.
    pub hedge: Decimal,
}

fn ratio(
    numerator: Decimal,
    divisor: Decimal,
    quote: &Quote,
    side: BookSide,
) -> Result<Decimal, OrderBookError> {
    numerator
        .checked_div(divisor)
        .ok_or_else(|| OrderBookError::ZeroPrice {
            market: quote.market.clone(),
            side,
        })
}

/// Cost of exiting both legs: `(high.ask - low.bid) / low.bid`.
pub fn outer_spread(high: &Quote, low: &Quote) -> Result<Decimal, OrderBookError> {
    let high_ask = high.buy_price()?;
    let low_bid = low.sell_price()?;
    ratio(high_ask - low_bid, low_bid, low, BookSide::Bid)
}

/// Premium captured entering both legs: `(high.bid - low.ask) / low.ask`.
pub fn inner_spread(high: &Quote, low: &Quote) -> Result<Decimal, OrderBookError> {
    let high_bid = high.sell_price()?;
    let low_ask = low.buy_price()?;
    ratio(high_bid - low_ask, low_ask, low, BookSide::Ask)
}

/// Spread locked in at entry: `(max - min) / min` of the two entry prices.
///
/// Zero when flat or when an entry price is zero.
pub fn enter_spread(perp_enter_price: Decimal, hedge_enter_price: Decimal) -> Decimal {
    let max = perp_enter_price.max(hedge_enter_price);
    let min = perp_enter_price.min(hedge_enter_price);
    (max - min).checked_div(min).unwrap_or(Decimal::ZERO)
}

/// Next-rate APR signed from the position's point of view: positive when the
/// position is paid, negative when it pays, zero when flat.
pub fn current_next_apr(size: Decimal, next_funding_rate: Decimal, leverage: Decimal) -> Decimal {
    let apr = funding_rate_to_apr(next_funding_rate, leverage);
    let exposure = size * next_funding_rate;
    if exposure < Decimal::ZERO {
        apr
    } else if exposure > Decimal::ZERO {
        -apr
    } else {
        Decimal::ZERO
    }
}

/// Fill prices for entering `side`: the long leg pays the ask, the short leg
/// receives the bid.
pub fn entry_prices(side: PositionSide, quotes: &LegQuotes) -> Result<EntryPrices, OrderBookError> {
    match side {
        PositionSide::ShortPerp => Ok(EntryPrices {
            perp: quotes.perp.sell_price()?,
            hedge: quotes.hedge.buy_price()?,
        }),
        _ => Ok(EntryPrices {
            perp: quotes.perp.buy_price()?,
            hedge: quotes.hedge.sell_price()?,
        }),
    }
}

/// Unrealised profit of both legs if closed at market now.
///
/// Closing a long perp sells it at the bid and buys the hedge back at the
/// ask; a short perp is the reverse.
pub fn hedge_profit(
    size: Decimal,
    perp_enter_price: Decimal,
    hedge_enter_price: Decimal,
    quotes: &LegQuotes,
) -> Result<Decimal, OrderBookError> {
    let long_perp = size > Decimal::ZERO;
    let (perp_mark, hedge_mark) = if long_perp {
        (quotes.perp.sell_price()?, quotes.hedge.buy_price()?)
    } else {
        (quotes.perp.buy_price()?, quotes.hedge.sell_price()?)
    };
    let (perp_side, hedge_side) = if long_perp {
        (BookSide::Bid, BookSide::Ask)
    } else {
        (BookSide::Ask, BookSide::Bid)
    };

    let s = size.abs();
    let mut perp_profit = s * ratio(perp_mark, perp_enter_price, &quotes.perp, perp_side)? - s;
    let mut hedge_leg_profit =
        s * ratio(hedge_mark, hedge_enter_price, &quotes.hedge, hedge_side)? - s;
    if long_perp {
        hedge_leg_profit = -hedge_leg_profit;
    } else {
        perp_profit = -perp_profit;
    }
    Ok(perp_profit + hedge_leg_profit)
}
