//! Reward dispenser for the reference host.
//!
//! The host has no inventory or wallet. It logs every delivered reward and
//! keeps a running total per reward kind so `status` can report it.

use std::cell::Cell;

use achievements_core::{RewardDispenser, RewardError};
use achievements_types::{RewardConfig, RewardKind};
use tracing::info;

/// Logs rewards of one kind and totals the granted amount.
#[derive(Debug)]
pub struct LedgerDispenser {
    kind: RewardKind,
    granted: Cell<u64>,
}

impl LedgerDispenser {
    /// Create a dispenser for `kind` with nothing granted.
    pub const fn new(kind: RewardKind) -> Self {
        Self {
            kind,
            granted: Cell::new(0),
        }
    }

    /// Total amount granted so far.
    pub fn granted(&self) -> u64 {
        self.granted.get()
    }
}

impl RewardDispenser for LedgerDispenser {
    fn target_kind(&self) -> &RewardKind {
        &self.kind
    }

    fn dispense(&self, reward: &RewardConfig) -> Result<(), RewardError> {
        let total = self
            .granted
            .get()
            .checked_add(u64::from(reward.amount))
            .ok_or_else(|| RewardError::new(self.kind.clone(), "granted total overflowed"))?;
        self.granted.set(total);
        info!(kind = %self.kind, amount = reward.amount, total, "Reward granted");
        Ok(())
    }
}
