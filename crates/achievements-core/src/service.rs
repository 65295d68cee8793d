//! The achievements service.
//!
//! [`AchievementsService`] is the entry point a host talks to. It owns the
//! ungrouped achievements, the groups, and the handlers, and keeps them
//! consistent:
//!
//! - Handlers receive the achievements of their kind once the service is
//!   initialized, whatever order handlers, achievements, and groups were
//!   added in.
//! - Group membership changes (initialization, restores, timed refreshes)
//!   are mirrored to the handlers as they happen. A handler rejecting a new
//!   member fails the group operation with [`GroupError::Binding`].
//! - Snapshots are fanned out to the owning achievement or group by id.
//!   Entries for content that no longer exists are logged and skipped.

use std::collections::BTreeMap;
use std::rc::Rc;

use achievements_types::{AchievementConfig, AchievementId, GroupId, ServiceSnapshot};
use tracing::{debug, info, warn};

use crate::achievement::{Achievement, AchievementError};
use crate::binding::HandlerBinder;
use crate::factory::{AchievementFactory, FactoryError};
use crate::group::{Group, GroupError, MembershipSink};
use crate::handler::{AchievementHandler, HandlerError};
use crate::tick::TickRegistrar;

/// Errors raised by the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// `init` was called twice.
    #[error("achievements service is already initialized")]
    AlreadyInitialized,

    /// A timed group was added but no tick registrar is available.
    #[error("group {group} needs a tick registrar and the service has none")]
    TickRegistrarMissing {
        /// The rejected group.
        group: GroupId,
    },

    /// A group with the same id is already registered.
    #[error("group {id} is already registered")]
    DuplicateGroup {
        /// The contested id.
        id: GroupId,
    },

    /// A group operation failed.
    #[error("group error: {source}")]
    Group {
        /// The underlying group error.
        #[from]
        source: GroupError,
    },

    /// Building an achievement failed.
    #[error("factory error: {source}")]
    Factory {
        /// The underlying factory error.
        #[from]
        source: FactoryError,
    },

    /// Binding an achievement to a handler failed.
    #[error("handler error: {source}")]
    Handler {
        /// The underlying handler error.
        #[from]
        source: HandlerError,
    },

    /// Restoring an achievement failed.
    #[error("achievement error: {source}")]
    Achievement {
        /// The underlying achievement error.
        #[from]
        source: AchievementError,
    },
}

/// A registered group and the registrar it was registered with for ticks.
struct GroupEntry {
    group: Rc<dyn Group>,
    registrar: Option<Rc<dyn TickRegistrar>>,
}

/// Owns achievements, groups, and handlers, and keeps them bound.
pub struct AchievementsService {
    /// Builds ungrouped achievements.
    factory: Rc<AchievementFactory>,
    /// Injected into timed groups that have none.
    registrar: Option<Rc<dyn TickRegistrar>>,
    /// Ungrouped achievements by id.
    achievements: BTreeMap<AchievementId, Rc<Achievement>>,
    /// Groups by id.
    groups: BTreeMap<GroupId, GroupEntry>,
    /// Installed as the membership sink of every group.
    binder: Rc<HandlerBinder>,
    /// One-shot initialization gate.
    initialized: bool,
}

impl AchievementsService {
    /// Create an empty, uninitialized service.
    pub fn new(factory: Rc<AchievementFactory>) -> Self {
        Self {
            factory,
            registrar: None,
            achievements: BTreeMap::new(),
            groups: BTreeMap::new(),
            binder: Rc::new(HandlerBinder::new()),
            initialized: false,
        }
    }

    /// Set the registrar injected into timed groups.
    pub fn set_tick_registrar(&mut self, registrar: Rc<dyn TickRegistrar>) {
        self.registrar = Some(registrar);
    }

    /// The factory used for ungrouped achievements.
    pub const fn factory(&self) -> &Rc<AchievementFactory> {
        &self.factory
    }

    /// Whether `init` has run.
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// One-shot initialization.
    ///
    /// Initializes every group that is not initialized yet, binds every
    /// achievement to its handlers, then initializes the handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AlreadyInitialized`] on a second call, or
    /// the first group or binding failure.
    pub fn init(&mut self) -> Result<(), ServiceError> {
        if self.initialized {
            return Err(ServiceError::AlreadyInitialized);
        }
        self.initialized = true;
        self.binder.activate();

        for entry in self.groups.values() {
            if !entry.group.is_initialized() {
                entry.group.init()?;
            }
            self.binder.bind_many(&entry.group.achievements())?;
        }
        self.binder.bind_many(&self.non_grouped_achievements())?;
        self.binder.init_handlers();

        info!(
            achievements = self.achievements.len(),
            groups = self.groups.len(),
            handlers = self.binder.handlers().len(),
            "Achievements service initialized"
        );
        Ok(())
    }

    /// Release everything: empty the handlers, unregister and dispose the
    /// groups, dispose the ungrouped achievements.
    ///
    /// The service can be initialized again afterwards.
    pub fn dispose(&mut self) {
        self.binder.clear();
        let groups = core::mem::take(&mut self.groups);
        for (id, entry) in groups {
            self.release_group(&id, &entry);
        }
        for achievement in core::mem::take(&mut self.achievements).into_values() {
            achievement.dispose();
        }
        self.initialized = false;
        info!("Achievements service disposed");
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Add a handler. After initialization it immediately receives every
    /// live achievement of its kind and is initialized.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Handler`] if the handler rejects one of the
    /// achievements.
    pub fn add_handler(&mut self, handler: Rc<dyn AchievementHandler>) -> Result<(), ServiceError> {
        self.binder.add_handler(Rc::clone(&handler));
        if self.initialized {
            self.binder.bind_handler(&handler, &self.all_achievements())?;
            handler.init();
        }
        debug!(handler = %handler.target_kind(), "Handler added");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ungrouped achievements
    // -----------------------------------------------------------------------

    /// Build and store an ungrouped achievement.
    ///
    /// An existing achievement with the same id is unbound and disposed
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Factory`] if the achievement cannot be built
    /// and [`ServiceError::Handler`] if binding it fails.
    pub fn add_achievement_by_config(
        &mut self,
        config: AchievementConfig,
    ) -> Result<Rc<Achievement>, ServiceError> {
        let achievement = self.factory.create(&Rc::new(config))?;
        if let Some(previous) = self
            .achievements
            .insert(achievement.id().clone(), Rc::clone(&achievement))
        {
            debug!(achievement = %previous.id(), "Replacing ungrouped achievement");
            self.binder.unbind(&previous);
            previous.dispose();
        }
        self.binder.bind(&achievement)?;
        Ok(achievement)
    }

    /// Build and store several ungrouped achievements.
    ///
    /// # Errors
    ///
    /// Stops at the first failure. Achievements added before it are kept.
    pub fn add_achievements_by_config(
        &mut self,
        configs: impl IntoIterator<Item = AchievementConfig>,
    ) -> Result<Vec<Rc<Achievement>>, ServiceError> {
        configs
            .into_iter()
            .map(|config| self.add_achievement_by_config(config))
            .collect()
    }

    /// Unbind and dispose an ungrouped achievement.
    ///
    /// Returns `false`, with a warning, if there is no such achievement.
    pub fn remove_achievement(&mut self, id: &AchievementId) -> bool {
        let Some(achievement) = self.achievements.remove(id) else {
            warn!(achievement = %id, "Cannot remove unknown achievement");
            return false;
        };
        self.binder.unbind(&achievement);
        achievement.dispose();
        debug!(achievement = %id, "Ungrouped achievement removed");
        true
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    /// Register a group.
    ///
    /// A group that rotates over time is registered for ticks right away,
    /// with its own registrar or, if it has none, with the service's, which
    /// is injected into it. After initialization the group is initialized
    /// and its members bound.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DuplicateGroup`] for a known id,
    /// [`ServiceError::TickRegistrarMissing`] when a timed group has no
    /// registrar to use, or the group's initialization or binding failure.
    pub fn add_group(&mut self, group: Rc<dyn Group>) -> Result<(), ServiceError> {
        let id = group.id().clone();
        if self.groups.contains_key(&id) {
            return Err(ServiceError::DuplicateGroup { id });
        }

        let registrar = match Rc::clone(&group).as_tickable() {
            Some(tickable) => {
                let registrar = match tickable.tick_registrar() {
                    Some(own) => own,
                    None => {
                        let Some(shared) = self.registrar.as_ref() else {
                            return Err(ServiceError::TickRegistrarMissing { group: id });
                        };
                        tickable.set_tick_registrar(Rc::clone(shared));
                        Rc::clone(shared)
                    }
                };
                registrar.register(tickable);
                Some(registrar)
            }
            None => None,
        };

        group.set_membership_sink(Some(Rc::clone(&self.binder) as Rc<dyn MembershipSink>));
        self.groups.insert(
            id.clone(),
            GroupEntry {
                group: Rc::clone(&group),
                registrar,
            },
        );

        if self.initialized {
            if !group.is_initialized() {
                group.init()?;
            }
            self.binder.bind_many(&group.achievements())?;
        }
        debug!(group = %id, "Group added");
        Ok(())
    }

    /// Register several groups.
    ///
    /// # Errors
    ///
    /// Stops at the first failure. Groups added before it are kept.
    pub fn add_groups(
        &mut self,
        groups: impl IntoIterator<Item = Rc<dyn Group>>,
    ) -> Result<(), ServiceError> {
        groups.into_iter().try_for_each(|group| self.add_group(group))
    }

    /// Remove a group: stop listening, unbind its members, unregister it
    /// from ticks, and dispose it.
    ///
    /// Returns `false`, with a warning, if there is no such group.
    pub fn remove_group(&mut self, id: &GroupId) -> bool {
        let Some(entry) = self.groups.remove(id) else {
            warn!(group = %id, "Cannot remove unknown group");
            return false;
        };
        self.release_group(id, &entry);
        debug!(group = %id, "Group removed");
        true
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Ungrouped achievement with the given id.
    pub fn achievement(&self, id: &AchievementId) -> Option<Rc<Achievement>> {
        self.achievements.get(id).cloned()
    }

    /// Group with the given id.
    pub fn group(&self, id: &GroupId) -> Option<Rc<dyn Group>> {
        self.groups.get(id).map(|entry| Rc::clone(&entry.group))
    }

    /// Every group, ordered by id.
    pub fn groups(&self) -> Vec<Rc<dyn Group>> {
        self.groups
            .values()
            .map(|entry| Rc::clone(&entry.group))
            .collect()
    }

    /// Ungrouped achievements, ordered by id.
    pub fn non_grouped_achievements(&self) -> Vec<Rc<Achievement>> {
        self.achievements.values().cloned().collect()
    }

    /// Ungrouped achievements followed by every group's live achievements.
    pub fn all_achievements(&self) -> Vec<Rc<Achievement>> {
        let mut all = self.non_grouped_achievements();
        for entry in self.groups.values() {
            all.extend(entry.group.achievements());
        }
        all
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Restore ungrouped achievements and groups from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first achievement or group restore failure.
    pub fn restore_state(&self, snapshot: &ServiceSnapshot) -> Result<(), ServiceError> {
        for entry in &snapshot.non_grouped_achievements {
            match self.achievements.get(&entry.id) {
                Some(achievement) => achievement.restore_state(entry)?,
                None => warn!(achievement = %entry.id, "Unknown achievement in snapshot, skipping"),
            }
        }
        for group_snapshot in &snapshot.groups {
            match self.groups.get(&group_snapshot.id) {
                Some(entry) => entry.group.restore_state(group_snapshot)?,
                None => warn!(group = %group_snapshot.id, "Unknown group in snapshot, skipping"),
            }
        }
        info!(
            achievements = snapshot.non_grouped_achievements.len(),
            groups = snapshot.groups.len(),
            "Achievements state restored"
        );
        Ok(())
    }

    /// Capture every ungrouped achievement and every group.
    pub fn capture_state(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            non_grouped_achievements: self
                .achievements
                .values()
                .map(|achievement| achievement.capture_state())
                .collect(),
            groups: self
                .groups
                .values()
                .map(|entry| entry.group.capture_state())
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn release_group(&self, id: &GroupId, entry: &GroupEntry) {
        entry.group.set_membership_sink(None);
        self.binder.unbind_many(&entry.group.achievements());
        if let Some(registrar) = entry.registrar.as_ref() {
            registrar.unregister(id);
        }
        entry.group.dispose();
    }
}

impl core::fmt::Debug for AchievementsService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AchievementsService")
            .field("achievements", &self.achievements.keys().collect::<Vec<_>>())
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .field("binder", &self.binder)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}
