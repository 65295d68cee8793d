//! Progress-application capability.
//!
//! A handler owns the game-side knowledge of *how* progress is earned for
//! one [`ConfigKind`]: a kill counter, a distance tracker, a quest log. The
//! service hands it every live achievement of that kind and takes them
//! back when they are rotated out or their group is removed. The handler
//! then pushes progress to all of them at once.
//!
//! Membership is by identity, not by id: two groups may each hold an
//! achievement built from the same configuration, and a handler can hold
//! both.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use achievements_types::{AchievementId, ConfigKind};
use tracing::debug;

use crate::achievement::{Achievement, AchievementError};

/// Errors raised when registering achievements with a handler or applying
/// bulk progress.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The achievement belongs to another configuration kind.
    #[error("handler '{handler}' cannot accept achievement {achievement} of kind '{kind}'")]
    KindMismatch {
        /// Kind served by the handler.
        handler: ConfigKind,
        /// The rejected achievement.
        achievement: AchievementId,
        /// Kind of the rejected achievement.
        kind: ConfigKind,
    },

    /// The achievement is already registered with this handler.
    #[error("achievement {achievement} is already registered with handler '{handler}'")]
    Duplicate {
        /// Kind served by the handler.
        handler: ConfigKind,
        /// The duplicate achievement.
        achievement: AchievementId,
    },

    /// A bulk progress amount of zero was supplied.
    #[error("bulk progress amount for handler '{handler}' must be positive")]
    NonPositiveProgress {
        /// Kind served by the handler.
        handler: ConfigKind,
    },

    /// Applying progress to one of the achievements failed.
    #[error("progress update failed: {source}")]
    Progress {
        /// The underlying achievement error.
        #[from]
        source: AchievementError,
    },
}

/// Receives the live achievements of one configuration kind.
pub trait AchievementHandler {
    /// The configuration kind this handler serves.
    fn target_kind(&self) -> &ConfigKind;

    /// Whether this exact achievement instance is registered.
    fn has_achievement(&self, achievement: &Achievement) -> bool;

    /// Register an achievement.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::KindMismatch`] for an achievement of another
    /// kind and [`HandlerError::Duplicate`] if it is already registered.
    fn add_achievement(&self, achievement: Rc<Achievement>) -> Result<(), HandlerError>;

    /// Unregister an achievement. Returns `false` if it was not registered.
    fn remove_achievement(&self, achievement: &Achievement) -> bool;

    /// Unregister every achievement.
    fn remove_all_achievements(&self);

    /// Called once when the owning service initializes.
    fn init(&self) {}
}

/// A handler that keeps its achievements in memory and applies progress to
/// all of them on demand.
///
/// Game code holds an `Rc<ProgressHandler>` and calls
/// [`add_progress_to_all`](Self::add_progress_to_all) whenever the tracked
/// activity happens.
#[derive(Debug)]
pub struct ProgressHandler {
    /// Kind served by this handler.
    kind: ConfigKind,
    /// Registered achievements, in registration order.
    achievements: RefCell<Vec<Rc<Achievement>>>,
    /// Set by [`AchievementHandler::init`].
    initialized: Cell<bool>,
}

impl ProgressHandler {
    /// Create an empty handler for the given kind.
    pub fn new(kind: impl Into<ConfigKind>) -> Self {
        Self {
            kind: kind.into(),
            achievements: RefCell::new(Vec::new()),
            initialized: Cell::new(false),
        }
    }

    /// Number of registered achievements.
    pub fn len(&self) -> usize {
        self.achievements.borrow().len()
    }

    /// Whether no achievement is registered.
    pub fn is_empty(&self) -> bool {
        self.achievements.borrow().is_empty()
    }

    /// Registered achievements, in registration order.
    pub fn achievements(&self) -> Vec<Rc<Achievement>> {
        self.achievements.borrow().clone()
    }

    /// Whether the owning service has initialized this handler.
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Add progress to every registered achievement that is not completed.
    ///
    /// Returns the number of achievements that received progress. Listeners
    /// reacting to the resulting events may add or remove achievements
    /// from this handler; the update runs over the membership as it was
    /// when the call started.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NonPositiveProgress`] for a zero amount.
    pub fn add_progress_to_all(&self, amount: u32) -> Result<usize, HandlerError> {
        if amount == 0 {
            return Err(HandlerError::NonPositiveProgress {
                handler: self.kind.clone(),
            });
        }

        let mut updated: usize = 0;
        for achievement in self.achievements() {
            if achievement.is_completed() {
                continue;
            }
            achievement.add_progress(amount)?;
            updated = updated.saturating_add(1);
        }

        debug!(handler = %self.kind, amount, updated, "Bulk progress applied");
        Ok(updated)
    }

    /// Apply [`Achievement::set_progress`] to every registered achievement.
    ///
    /// Returns the number of achievements visited.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NonPositiveProgress`] for a zero value.
    pub fn set_progress_to_all(&self, value: u32) -> Result<usize, HandlerError> {
        if value == 0 {
            return Err(HandlerError::NonPositiveProgress {
                handler: self.kind.clone(),
            });
        }

        let snapshot = self.achievements();
        for achievement in &snapshot {
            achievement.set_progress(value)?;
        }
        Ok(snapshot.len())
    }
}

impl AchievementHandler for ProgressHandler {
    fn target_kind(&self) -> &ConfigKind {
        &self.kind
    }

    fn has_achievement(&self, achievement: &Achievement) -> bool {
        self.achievements
            .borrow()
            .iter()
            .any(|existing| core::ptr::eq(Rc::as_ptr(existing), achievement))
    }

    fn add_achievement(&self, achievement: Rc<Achievement>) -> Result<(), HandlerError> {
        if achievement.kind() != &self.kind {
            return Err(HandlerError::KindMismatch {
                handler: self.kind.clone(),
                achievement: achievement.id().clone(),
                kind: achievement.kind().clone(),
            });
        }
        if self.has_achievement(&achievement) {
            return Err(HandlerError::Duplicate {
                handler: self.kind.clone(),
                achievement: achievement.id().clone(),
            });
        }
        self.achievements.borrow_mut().push(achievement);
        Ok(())
    }

    fn remove_achievement(&self, achievement: &Achievement) -> bool {
        let mut achievements = self.achievements.borrow_mut();
        let before = achievements.len();
        achievements.retain(|existing| !core::ptr::eq(Rc::as_ptr(existing), achievement));
        achievements.len() != before
    }

    fn remove_all_achievements(&self) {
        self.achievements.borrow_mut().clear();
    }

    fn init(&self) {
        self.initialized.set(true);
    }
}
