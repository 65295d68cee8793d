//! The achievement progress state machine.
//!
//! An [`Achievement`] moves through three states:
//!
//! ```text
//! Active (progress < target) --> Completed (progress >= target) --> RewardDispensed
//!    ^                                                                     |
//!    +------------------------------ reset_progress -----------------------+
//! ```
//!
//! Progress only grows, clamped at the target, until an explicit reset.
//! Every mutation emits an [`AchievementEvent`] synchronously, in the order
//! the mutations happen.
//!
//! # Replayable achievements
//!
//! [`Achievement::reset_progress`] clears the dispensed flag without
//! reclaiming anything from the player. Resetting is how a host makes an
//! achievement repeatable; a reset followed by a new completion pays out
//! again. [`Achievement::dispense_reward`] itself refuses a second payout
//! for the same completion.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use achievements_types::{AchievementConfig, AchievementId, AchievementSnapshot, ConfigKind};
use tracing::{debug, warn};

use crate::handler::{AchievementHandler, HandlerError};
use crate::notify::{ListenerId, Notifier};
use crate::reward::{RewardDispenser, RewardError};

/// Errors raised by achievement operations. None of them mutate state.
#[derive(Debug, thiserror::Error)]
pub enum AchievementError {
    /// A progress amount of zero was supplied.
    #[error("progress amount for achievement {id} must be positive")]
    NonPositiveProgress {
        /// The achievement.
        id: AchievementId,
    },

    /// Progress was added to an achievement that is already completed.
    #[error("achievement {id} is already completed")]
    AlreadyCompleted {
        /// The achievement.
        id: AchievementId,
    },

    /// A reward was requested before the target was reached.
    #[error("achievement {id} is not completed ({progress}/{target})")]
    NotCompleted {
        /// The achievement.
        id: AchievementId,
        /// Current progress.
        progress: u32,
        /// Target progress.
        target: u32,
    },

    /// The reward for the current completion was already delivered.
    #[error("reward for achievement {id} was already dispensed")]
    AlreadyDispensed {
        /// The achievement.
        id: AchievementId,
    },

    /// A snapshot belonging to another achievement was supplied.
    #[error("snapshot id {snapshot} does not match achievement {expected}")]
    SnapshotMismatch {
        /// Identifier of this achievement.
        expected: AchievementId,
        /// Identifier found in the snapshot.
        snapshot: AchievementId,
    },

    /// The bound reward dispenser failed.
    #[error("reward dispenser failed: {source}")]
    Dispenser {
        /// The underlying dispenser error.
        #[from]
        source: RewardError,
    },
}

/// Notification emitted by an [`Achievement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AchievementEvent {
    /// Progress was added, set, or reset.
    ProgressChanged {
        /// The achievement.
        id: AchievementId,
        /// Progress after the change.
        progress: u32,
        /// Target progress.
        target: u32,
    },
    /// Progress reached the target. Emitted once per crossing.
    Completed {
        /// The achievement.
        id: AchievementId,
    },
    /// The reward was delivered.
    RewardDispensed {
        /// The achievement.
        id: AchievementId,
    },
}

/// A trackable goal with progress, bound to its reward dispenser and
/// (optionally) to a handler for its whole lifetime.
pub struct Achievement {
    /// Shared, immutable configuration.
    config: Rc<AchievementConfig>,
    /// Delivers the reward on claim.
    dispenser: Rc<dyn RewardDispenser>,
    /// Handler bound at construction by a handler-aware factory.
    handler: Option<Weak<dyn AchievementHandler>>,
    /// Accumulated progress, never above the target.
    progress: Cell<u32>,
    /// Whether the reward for the current completion was delivered.
    reward_dispensed: Cell<bool>,
    /// Listeners for this achievement's events.
    events: Notifier<AchievementEvent>,
}

impl Achievement {
    /// Create an achievement with zero progress.
    ///
    /// Normally called by [`AchievementFactory`], which resolves the
    /// capabilities from the configuration.
    ///
    /// [`AchievementFactory`]: crate::factory::AchievementFactory
    pub fn new(
        config: Rc<AchievementConfig>,
        dispenser: Rc<dyn RewardDispenser>,
        handler: Option<&Rc<dyn AchievementHandler>>,
    ) -> Self {
        Self {
            config,
            dispenser,
            handler: handler.map(Rc::downgrade),
            progress: Cell::new(0),
            reward_dispensed: Cell::new(false),
            events: Notifier::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Identifier, taken from the configuration.
    pub fn id(&self) -> &AchievementId {
        &self.config.id
    }

    /// Configuration kind, used for handler matching.
    pub fn kind(&self) -> &ConfigKind {
        &self.config.kind
    }

    /// The shared configuration.
    pub fn config(&self) -> &Rc<AchievementConfig> {
        &self.config
    }

    /// Current progress.
    pub fn progress(&self) -> u32 {
        self.progress.get()
    }

    /// Progress required for completion.
    pub fn target(&self) -> u32 {
        self.config.target_progress
    }

    /// Progress still missing before completion.
    pub fn remaining(&self) -> u32 {
        self.target().saturating_sub(self.progress())
    }

    /// Whether the target has been reached.
    pub fn is_completed(&self) -> bool {
        self.progress() >= self.target()
    }

    /// Whether the reward for the current completion was delivered.
    pub fn is_reward_dispensed(&self) -> bool {
        self.reward_dispensed.get()
    }

    /// Whether the achievement is completed but its reward is still pending.
    pub fn is_claimable(&self) -> bool {
        self.is_completed() && !self.is_reward_dispensed()
    }

    /// The handler bound at construction, if it is still alive.
    pub fn bound_handler(&self) -> Option<Rc<dyn AchievementHandler>> {
        self.handler.as_ref().and_then(Weak::upgrade)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Register a listener for this achievement's events.
    pub fn subscribe(&self, listener: impl Fn(&AchievementEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Add progress, clamped so it never exceeds the target.
    ///
    /// Returns the amount actually applied.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementError::NonPositiveProgress`] for a zero amount
    /// and [`AchievementError::AlreadyCompleted`] if the target was already
    /// reached.
    pub fn add_progress(&self, amount: u32) -> Result<u32, AchievementError> {
        if amount == 0 {
            return Err(AchievementError::NonPositiveProgress {
                id: self.id().clone(),
            });
        }
        if self.is_completed() {
            return Err(AchievementError::AlreadyCompleted {
                id: self.id().clone(),
            });
        }
        Ok(self.apply_progress(amount))
    }

    /// Add up to `value` progress, clamped at the target.
    ///
    /// This is additive, not an absolute assignment: the current progress
    /// grows by `min(value, target - progress)`. Unlike
    /// [`add_progress`](Self::add_progress) it is accepted on a completed
    /// achievement, where it applies nothing but still reports a progress
    /// change.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementError::NonPositiveProgress`] for a zero value.
    pub fn set_progress(&self, value: u32) -> Result<u32, AchievementError> {
        if value == 0 {
            return Err(AchievementError::NonPositiveProgress {
                id: self.id().clone(),
            });
        }
        Ok(self.apply_progress(value))
    }

    /// Reset progress to zero and clear the dispensed flag.
    ///
    /// Only a progress change is reported, even when the achievement was
    /// completed or claimed before.
    pub fn reset_progress(&self) {
        self.progress.set(0);
        self.reward_dispensed.set(false);
        debug!(achievement = %self.id(), "Achievement progress reset");
        self.emit_progress_changed();
    }

    fn apply_progress(&self, value: u32) -> u32 {
        let was_completed = self.is_completed();
        let applied = value.min(self.remaining());
        self.progress.set(self.progress().saturating_add(applied));

        debug!(
            achievement = %self.id(),
            applied,
            progress = self.progress(),
            target = self.target(),
            "Achievement progress changed"
        );
        self.emit_progress_changed();

        if !was_completed && self.is_completed() {
            debug!(achievement = %self.id(), "Achievement completed");
            self.events.emit(&AchievementEvent::Completed {
                id: self.id().clone(),
            });
        }
        applied
    }

    fn emit_progress_changed(&self) {
        self.events.emit(&AchievementEvent::ProgressChanged {
            id: self.id().clone(),
            progress: self.progress(),
            target: self.target(),
        });
    }

    // -----------------------------------------------------------------------
    // Rewards
    // -----------------------------------------------------------------------

    /// Deliver the reward through the bound dispenser.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementError::NotCompleted`] before completion,
    /// [`AchievementError::AlreadyDispensed`] on a second claim, and
    /// [`AchievementError::Dispenser`] if delivery failed. The dispensed flag
    /// is only set on success.
    pub fn dispense_reward(&self) -> Result<(), AchievementError> {
        if !self.is_completed() {
            return Err(AchievementError::NotCompleted {
                id: self.id().clone(),
                progress: self.progress(),
                target: self.target(),
            });
        }
        if self.is_reward_dispensed() {
            return Err(AchievementError::AlreadyDispensed {
                id: self.id().clone(),
            });
        }

        self.dispenser.dispense(&self.config.reward)?;
        self.reward_dispensed.set(true);

        debug!(
            achievement = %self.id(),
            reward = %self.config.reward.kind,
            amount = self.config.reward.amount,
            "Achievement reward dispensed"
        );
        self.events.emit(&AchievementEvent::RewardDispensed {
            id: self.id().clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Copy persisted state into this achievement. No events are emitted.
    ///
    /// A persisted progress above the current target (the target was
    /// lowered since the save) is clamped to the target.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementError::SnapshotMismatch`] if the snapshot
    /// belongs to another achievement.
    pub fn restore_state(&self, snapshot: &AchievementSnapshot) -> Result<(), AchievementError> {
        if snapshot.id != *self.id() {
            return Err(AchievementError::SnapshotMismatch {
                expected: self.id().clone(),
                snapshot: snapshot.id.clone(),
            });
        }

        let progress = if snapshot.progress > self.target() {
            warn!(
                achievement = %self.id(),
                persisted = snapshot.progress,
                target = self.target(),
                "Persisted progress exceeds target, clamping"
            );
            self.target()
        } else {
            snapshot.progress
        };

        self.progress.set(progress);
        self.reward_dispensed.set(snapshot.is_reward_dispensed);
        Ok(())
    }

    /// Capture the persisted state of this achievement.
    pub fn capture_state(&self) -> AchievementSnapshot {
        AchievementSnapshot {
            id: self.id().clone(),
            progress: self.progress(),
            is_reward_dispensed: self.is_reward_dispensed(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Add this achievement to its bound handler, if any.
    ///
    /// Returns `true` if the handler accepted it, `false` if there is no
    /// bound handler or it already holds this achievement.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the handler rejects the achievement.
    pub fn attach(self: &Rc<Self>) -> Result<bool, HandlerError> {
        let Some(handler) = self.bound_handler() else {
            return Ok(false);
        };
        if handler.has_achievement(self) {
            return Ok(false);
        }
        handler.add_achievement(Rc::clone(self))?;
        Ok(true)
    }

    /// Remove this achievement from its bound handler, if any.
    pub fn detach(&self) {
        if let Some(handler) = self.bound_handler() {
            handler.remove_achievement(self);
        }
    }

    /// Detach from the bound handler and drop every listener.
    pub fn dispose(&self) {
        self.detach();
        self.events.clear();
    }
}

impl core::fmt::Debug for Achievement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Achievement")
            .field("id", self.id())
            .field("kind", self.kind())
            .field("progress", &self.progress())
            .field("target", &self.target())
            .field("reward_dispensed", &self.is_reward_dispensed())
            .finish_non_exhaustive()
    }
}
