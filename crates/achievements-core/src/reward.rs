//! Reward delivery capability.
//!
//! The core never knows what a reward *is*. It hands the configured
//! [`RewardConfig`] to whichever [`RewardDispenser`] declared the matching
//! [`RewardKind`], and the dispenser talks to the inventory, wallet, or
//! mail system of the host.

use achievements_types::{RewardConfig, RewardKind};

/// Error reported by a dispenser that could not deliver a reward.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reward dispenser for kind '{kind}' failed: {message}")]
pub struct RewardError {
    /// Kind of the reward that failed to dispense.
    pub kind: RewardKind,
    /// Description supplied by the dispenser.
    pub message: String,
}

impl RewardError {
    /// Create a dispenser error for the given reward kind.
    pub fn new(kind: RewardKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Delivers rewards of one kind.
pub trait RewardDispenser {
    /// The reward kind this dispenser delivers.
    fn target_kind(&self) -> &RewardKind;

    /// Deliver the reward described by `reward`.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError`] if the host could not grant the reward. The
    /// achievement stays claimable in that case.
    fn dispense(&self, reward: &RewardConfig) -> Result<(), RewardError>;
}
