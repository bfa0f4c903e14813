//! Funding rate history and annualisation.

pub mod window;

pub use window::{funding_rate_to_apr, FundingWindow, HOURS_PER_YEAR};
