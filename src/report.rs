//! Profit reporting: ROI arithmetic and the operator-facing summaries.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::arbitrage::TrackedPair;
use crate::funding::funding_rate_to_apr;

const SECONDS_PER_YEAR: i64 = 365 * 24 * 3600;

/// `(current - init) / init`, zero when `init` is zero.
pub fn calc_roi(init_balance: Decimal, current_balance: Decimal) -> Decimal {
    (current_balance - init_balance)
        .checked_div(init_balance)
        .unwrap_or(Decimal::ZERO)
}

/// Linear annualisation of `roi` earned over `runtime`. Zero for an empty runtime.
pub fn annualize_roi(roi: Decimal, runtime: Duration) -> Decimal {
    let secs = runtime.as_secs();
    if secs == 0 {
        return Decimal::ZERO;
    }
    roi * Decimal::from(SECONDS_PER_YEAR) / Decimal::from(secs)
}

/// `1d 2h 3m 4s`, leading zero units omitted.
pub fn format_runtime(runtime: Duration) -> String {
    let total = runtime.as_secs();
    let (d, h, m, s) = (total / 86_400, total % 86_400 / 3600, total % 3600 / 60, total % 60);
    if d > 0 {
        format!("{d}d {h}h {m}m {s}s")
    } else if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

fn pct(x: Decimal) -> String {
    format!("{:.2}", x * dec!(100))
}

/// Snapshot of one pair for reports and the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairStatus {
    /// Base asset.
    pub name: String,
    /// Signed perp size.
    pub size: Decimal,
    /// Trailing average APR.
    pub average_apr: Decimal,
    /// Leading same-sign rates.
    pub consecutive_sign_count: usize,
    /// Predicted next rate.
    pub next_funding_rate: Decimal,
    /// APR of the predicted rate.
    pub next_apr: Decimal,
    /// Hedge market name.
    pub hedge_market: String,
    /// Hedge counts toward collateral.
    pub is_collateral_efficient: bool,
    /// Position can run at full leverage.
    pub can_perfect_leverage: bool,
    /// Unrealised profit of both legs.
    pub current_hedge_profit: Decimal,
    /// Realised profit.
    pub total_profit: Decimal,
}

impl PairStatus {
    /// Capture `pair` at `leverage`.
    pub fn from_pair(pair: &TrackedPair, leverage: Decimal) -> Self {
        Self {
            name: pair.spec.base.clone(),
            size: pair.size,
            average_apr: pair.average_annualized_rate,
            consecutive_sign_count: pair.consecutive_sign_count,
            next_funding_rate: pair.next_funding_rate,
            next_apr: funding_rate_to_apr(pair.next_funding_rate, leverage),
            hedge_market: pair.spec.hedge_market.clone(),
            is_collateral_efficient: pair.spec.is_collateral_efficient,
            can_perfect_leverage: pair.size >= Decimal::ZERO || pair.spec.is_collateral_efficient,
            current_hedge_profit: pair.current_hedge_profit,
            total_profit: pair.total_profit,
        }
    }

    /// Position held.
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    /// Hedge profit as a share of size.
    pub fn hedge_profit_roi(&self) -> Decimal {
        self.current_hedge_profit
            .checked_div(self.size.abs())
            .unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "size: {:.2}", self.size)?;
        writeln!(f, "avgAPR: {}%", pct(self.average_apr))?;
        writeln!(f, "consCount: {}", self.consecutive_sign_count)?;
        writeln!(
            f,
            "next funding rate: {} (APR {}%)",
            self.next_funding_rate,
            pct(self.next_apr)
        )?;
        writeln!(f, "hedgePair: {}", self.hedge_market)?;
        writeln!(
            f,
            "isCollaterable: {}, canPerfectLeverage: {}",
            self.is_collateral_efficient, self.can_perfect_leverage
        )?;
        writeln!(
            f,
            "current hedge profit: {:.2} ({}%)",
            self.current_hedge_profit,
            pct(self.hedge_profit_roi())
        )?;
        writeln!(f, "total profit: {:.2}", self.total_profit)?;
        write!(
            f,
            "total profit + current hedge profit: {:.2}",
            self.total_profit + self.current_hedge_profit
        )
    }
}

/// Statuses sorted by average APR, highest first.
pub fn apr_ranking(statuses: &[PairStatus]) -> Vec<&PairStatus> {
    let mut ranked: Vec<&PairStatus> = statuses.iter().collect();
    ranked.sort_by(|a, b| b.average_apr.cmp(&a.average_apr));
    ranked
}

/// Whole-book return summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoiReport {
    /// Time since startup in seconds.
    pub runtime_secs: u64,
    /// Sum of realised profit.
    pub total_profit: Decimal,
    /// Sum of unrealised hedge profit.
    pub total_hedge_profit: Decimal,
    /// Uncommitted capital.
    pub free_balance: Decimal,
    /// Return against the reference balance.
    pub roi: Decimal,
    /// Linear annualisation of `roi`.
    pub apr: Decimal,
}

impl RoiReport {
    /// Build the report from pair statuses.
    pub fn compute(
        statuses: &[PairStatus],
        init_balance: Decimal,
        free_balance: Decimal,
        runtime: Duration,
    ) -> Self {
        let total_profit: Decimal = statuses.iter().map(|s| s.total_profit).sum();
        let total_hedge_profit: Decimal = statuses.iter().map(|s| s.current_hedge_profit).sum();
        let roi = calc_roi(init_balance, init_balance + total_profit + total_hedge_profit);
        Self {
            runtime_secs: runtime.as_secs(),
            total_profit,
            total_hedge_profit,
            free_balance,
            roi,
            apr: annualize_roi(roi, runtime),
        }
    }
}

impl fmt::Display for RoiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ROI Report")?;
        writeln!(f, "runtime: {}", format_runtime(Duration::from_secs(self.runtime_secs)))?;
        writeln!(f)?;
        writeln!(f, "total profit: {:.2}", self.total_profit)?;
        writeln!(
            f,
            "total profit w/ hedge: {:.2}",
            self.total_profit + self.total_hedge_profit
        )?;
        writeln!(f, "current free balance {:.2}", self.free_balance)?;
        writeln!(f, "ROI: {}%", pct(self.roi))?;
        write!(f, "apr: {}%", pct(self.apr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{PairId, PositionSide};
    use crate::funding::FundingWindow;
    use crate::market::PairSpec;
    use pretty_assertions::assert_eq;

    fn status(name: &str, apr: Decimal, size: Decimal) -> PairStatus {
        let mut pair = TrackedPair::new(
            PairId(0),
            PairSpec::spot_hedged(name, true),
            FundingWindow::new(24),
            dec!(5),
        );
        pair.average_annualized_rate = apr;
        if !size.is_zero() {
            pair.apply_start(PositionSide::of(size), size.abs(), dec!(100), dec!(100), Decimal::ZERO);
        }
        PairStatus::from_pair(&pair, dec!(5))
    }

    #[test]
    fn roi_and_linear_apr() {
        assert_eq!(calc_roi(dec!(1000), dec!(1100)), dec!(0.1));
        assert_eq!(calc_roi(Decimal::ZERO, dec!(10)), Decimal::ZERO);

        let half_year = Duration::from_secs(SECONDS_PER_YEAR as u64 / 2);
        assert_eq!(annualize_roi(dec!(0.1), half_year), dec!(0.2));
        assert_eq!(annualize_roi(dec!(0.1), Duration::ZERO), Decimal::ZERO);
    }

    #[test]
    fn runtime_formatting() {
        assert_eq!(format_runtime(Duration::from_secs(42)), "42s");
        assert_eq!(format_runtime(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_runtime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn ranking_is_descending_by_average_apr() {
        let statuses = vec![
            status("A", dec!(0.1), Decimal::ZERO),
            status("B", dec!(0.5), Decimal::ZERO),
            status("C", dec!(0.3), Decimal::ZERO),
        ];

        let names: Vec<&str> = apr_ranking(&statuses).iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn roi_report_sums_pairs() {
        let mut a = status("A", Decimal::ZERO, dec!(100));
        a.total_profit = dec!(6);
        a.current_hedge_profit = dec!(4);

        let report = RoiReport::compute(&[a], dec!(1000), dec!(500), Duration::from_secs(3600));

        assert_eq!(report.roi, dec!(0.01));
        assert_eq!(report.apr, dec!(87.6));
        let text = report.to_string();
        assert!(text.starts_with("ROI Report\nruntime: 1h 0m 0s"));
        assert!(text.contains("total profit w/ hedge: 10.00"));
        assert!(text.contains("ROI: 1.00%"));
    }

    #[test]
    fn pair_status_text() {
        let mut s = status("BTC", dec!(0.25), dec!(-200));
        s.current_hedge_profit = dec!(2);

        let text = s.to_string();

        assert!(text.starts_with("BTC\nsize: -200.00\navgAPR: 25.00%"));
        assert!(text.contains("hedgePair: BTC/USD"));
        assert!(text.contains("current hedge profit: 2.00 (1.00%)"));
    }
}
