//! Handler binding.
//!
//! A handler receives an achievement when their kinds match and the owning
//! service is initialized. The [`HandlerBinder`] evaluates that rule
//! whenever something changes: a handler is added, an achievement is
//! added, or a group's membership changes. It is shared between the
//! service and its groups, which use it as their [`MembershipSink`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::achievement::Achievement;
use crate::group::{GroupUpdate, MembershipSink};
use crate::handler::{AchievementHandler, HandlerError};

/// Keeps the registered handlers in sync with the live achievements.
#[derive(Default)]
pub struct HandlerBinder {
    /// Registered handlers, in registration order.
    handlers: RefCell<Vec<Rc<dyn AchievementHandler>>>,
    /// Binding is suspended until the service initializes.
    active: Cell<bool>,
}

impl HandlerBinder {
    /// Create an inactive binder with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered handlers, in registration order.
    pub fn handlers(&self) -> Vec<Rc<dyn AchievementHandler>> {
        self.handlers.borrow().clone()
    }

    /// Whether binding is active.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Start binding. Returns `false` if already active.
    pub fn activate(&self) -> bool {
        !self.active.replace(true)
    }

    /// Store a handler. Nothing is bound to it yet.
    pub fn add_handler(&self, handler: Rc<dyn AchievementHandler>) {
        self.handlers.borrow_mut().push(handler);
    }

    /// Bind the given achievements to one handler.
    ///
    /// # Errors
    ///
    /// Returns the [`HandlerError`] of the first rejected achievement.
    pub fn bind_handler(
        &self,
        handler: &Rc<dyn AchievementHandler>,
        achievements: &[Rc<Achievement>],
    ) -> Result<usize, HandlerError> {
        if !self.is_active() {
            return Ok(0);
        }
        let mut bound: usize = 0;
        for achievement in achievements {
            if Self::offer(handler, achievement)? {
                bound = bound.saturating_add(1);
            }
        }
        debug!(handler = %handler.target_kind(), bound, "Handler bound to existing achievements");
        Ok(bound)
    }

    /// Bind one achievement to every matching handler, and to the handler
    /// it was bound to at construction.
    ///
    /// # Errors
    ///
    /// Returns the [`HandlerError`] of the first handler that rejected it.
    pub fn bind(&self, achievement: &Rc<Achievement>) -> Result<(), HandlerError> {
        if !self.is_active() {
            return Ok(());
        }
        for handler in self.handlers() {
            Self::offer(&handler, achievement)?;
        }
        achievement.attach()?;
        Ok(())
    }

    /// Bind every achievement in `achievements`.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub fn bind_many(&self, achievements: &[Rc<Achievement>]) -> Result<(), HandlerError> {
        achievements
            .iter()
            .try_for_each(|achievement| self.bind(achievement))
    }

    /// Remove one achievement from every handler.
    pub fn unbind(&self, achievement: &Achievement) {
        for handler in self.handlers() {
            handler.remove_achievement(achievement);
        }
        achievement.detach();
    }

    /// Remove every achievement in `achievements` from every handler.
    pub fn unbind_many(&self, achievements: &[Rc<Achievement>]) {
        for achievement in achievements {
            self.unbind(achievement);
        }
    }

    /// Apply a group membership change: unbind removed, then bind added.
    ///
    /// # Errors
    ///
    /// Returns the first binding failure for an added achievement.
    pub fn apply(&self, update: &GroupUpdate) -> Result<(), HandlerError> {
        self.unbind_many(&update.removed);
        self.bind_many(&update.added)
    }

    /// Call [`AchievementHandler::init`] on every handler.
    pub fn init_handlers(&self) {
        for handler in self.handlers() {
            handler.init();
        }
    }

    /// Empty every handler and deactivate.
    pub fn clear(&self) {
        for handler in self.handlers() {
            handler.remove_all_achievements();
        }
        self.active.set(false);
    }

    fn offer(
        handler: &Rc<dyn AchievementHandler>,
        achievement: &Rc<Achievement>,
    ) -> Result<bool, HandlerError> {
        if handler.target_kind() != achievement.kind() || handler.has_achievement(achievement) {
            return Ok(false);
        }
        handler.add_achievement(Rc::clone(achievement))?;
        Ok(true)
    }
}

impl MembershipSink for HandlerBinder {
    fn apply(&self, update: &GroupUpdate) -> Result<(), HandlerError> {
        Self::apply(self, update)
    }
}

impl core::fmt::Debug for HandlerBinder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kinds: Vec<String> = self
            .handlers
            .borrow()
            .iter()
            .map(|handler| handler.target_kind().to_string())
            .collect();
        f.debug_struct("HandlerBinder")
            .field("handlers", &kinds)
            .field("active", &self.active.get())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use achievements_types::{AchievementConfig, RewardConfig, RewardKind};

    use super::*;
    use crate::handler::ProgressHandler;
    use crate::reward::{RewardDispenser, RewardError};

    struct NullDispenser(RewardKind);

    impl RewardDispenser for NullDispenser {
        fn target_kind(&self) -> &RewardKind {
            &self.0
        }

        fn dispense(&self, _reward: &RewardConfig) -> Result<(), RewardError> {
            Ok(())
        }
    }

    fn achievement(id: &str, kind: &str) -> Rc<Achievement> {
        let config = Rc::new(AchievementConfig::new(id, kind, 3, RewardConfig::new("coins", 1)));
        let dispenser: Rc<dyn RewardDispenser> = Rc::new(NullDispenser(RewardKind::new("coins")));
        Rc::new(Achievement::new(config, dispenser, None))
    }

    #[test]
    fn inactive_binder_binds_nothing() {
        let binder = HandlerBinder::new();
        let kills = Rc::new(ProgressHandler::new("kills"));
        binder.add_handler(Rc::clone(&kills) as Rc<dyn AchievementHandler>);

        binder.bind(&achievement("first_blood", "kills")).unwrap();
        assert!(kills.is_empty());
    }

    #[test]
    fn binds_only_matching_kinds() {
        let binder = HandlerBinder::new();
        let kills = Rc::new(ProgressHandler::new("kills"));
        let distance = Rc::new(ProgressHandler::new("distance"));
        binder.add_handler(Rc::clone(&kills) as Rc<dyn AchievementHandler>);
        binder.add_handler(Rc::clone(&distance) as Rc<dyn AchievementHandler>);
        assert!(binder.activate());
        assert!(!binder.activate());

        let first_blood = achievement("first_blood", "kills");
        binder.bind(&first_blood).unwrap();
        binder.bind(&first_blood).unwrap();
        assert_eq!(kills.len(), 1);
        assert!(distance.is_empty());

        binder.unbind(&first_blood);
        assert!(kills.is_empty());
    }

    #[test]
    fn apply_unbinds_before_binding() {
        let binder = HandlerBinder::new();
        let kills = Rc::new(ProgressHandler::new("kills"));
        binder.add_handler(Rc::clone(&kills) as Rc<dyn AchievementHandler>);
        binder.activate();

        let old = achievement("hunter", "kills");
        binder.bind(&old).unwrap();
        let new = achievement("hunter", "kills");
        binder
            .apply(&GroupUpdate {
                removed: vec![Rc::clone(&old)],
                added: vec![Rc::clone(&new)],
            })
            .unwrap();

        assert_eq!(kills.len(), 1);
        assert!(kills.has_achievement(&new));
        assert!(!kills.has_achievement(&old));
    }

    #[test]
    fn late_handler_receives_existing_achievements() {
        let binder = HandlerBinder::new();
        binder.activate();
        let existing = vec![achievement("a", "kills"), achievement("b", "distance")];

        let kills: Rc<dyn AchievementHandler> = Rc::new(ProgressHandler::new("kills"));
        binder.add_handler(Rc::clone(&kills));
        assert_eq!(binder.bind_handler(&kills, &existing).unwrap(), 1);
    }
}
