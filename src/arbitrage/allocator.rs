//! Capital ledger and per-batch sizing.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StrategyParams;
use crate::error::AllocationError;

/// Free capital available to open or grow pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapitalLedger {
    free_balance: Decimal,
}

impl CapitalLedger {
    /// Ledger starting at `free_balance`, floored at zero.
    pub fn new(free_balance: Decimal) -> Self {
        Self {
            free_balance: free_balance.max(Decimal::ZERO),
        }
    }

    /// Current free balance.
    pub fn free_balance(&self) -> Decimal {
        self.free_balance
    }

    /// Return capital released by a closed pair. Negative amounts are ignored.
    pub fn credit(&mut self, amount: Decimal) {
        if amount > Decimal::ZERO {
            self.free_balance += amount;
        }
    }

    /// Take `amount` out of the free balance.
    pub fn debit(&mut self, amount: Decimal) -> Result<(), AllocationError> {
        if amount < Decimal::ZERO || amount > self.free_balance {
            return Err(AllocationError::InsufficientBalance {
                requested: amount,
                available: self.free_balance,
            });
        }
        self.free_balance -= amount;
        Ok(())
    }

    /// Size a batch of `count` triggered pairs.
    pub fn decide(&self, count: usize, params: &StrategyParams) -> AllocationDecision {
        let allocated = self.free_balance * params.free_balance_allocate_rate;
        let n = Decimal::from(count);
        if count == 0 || allocated < params.min_amount * n {
            return AllocationDecision::Skipped {
                allocated,
                required: params.min_amount * n,
            };
        }
        AllocationDecision::Allocate {
            per_pair_size: allocated / Decimal::TWO * params.leverage / n,
            total: allocated,
        }
    }
}

/// Outcome of sizing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationDecision {
    /// Apply the batch and debit `total`.
    Allocate {
        /// Notional added to each triggered pair.
        per_pair_size: Decimal,
        /// Capital taken from the free balance.
        total: Decimal,
    },
    /// Not enough capital for the minimum per pair, or nothing to size.
    Skipped {
        /// What would have been allocated.
        allocated: Decimal,
        /// Minimum needed for the batch.
        required: Decimal,
    },
}
