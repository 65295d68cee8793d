//! Achievement groups.
//!
//! A group is a keyed collection of achievements built from a declared pool
//! of configurations. [`AchievementGroup`] is generic over the configuration
//! set so that static and timed groups share one implementation of keyed
//! membership, one-shot initialization, and snapshot reconciliation.
//!
//! # Snapshot reconciliation
//!
//! Restoring a group reconciles three sources of truth: the live
//! achievements, the persisted snapshot, and the declared pool.
//!
//! | Snapshot entry | Live | Declared | Result |
//! |----------------|------|----------|--------|
//! | id | yes | -- | restore into the live achievement |
//! | id | no | yes | build from the pool, restore, add |
//! | id | no | no | log and skip (content removed since the save) |
//!
//! Membership changes are always published as a single
//! [`GroupEvent::MembershipChanged`]. The [`MembershipSink`], if any, sees
//! the change first, and its failure is returned to the caller after the
//! listeners have been notified.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use achievements_types::{
    AchievementConfig, AchievementId, GroupId, GroupSnapshot, SimpleGroupConfig, TimedGroupConfig,
};
use tracing::{debug, warn};

use crate::achievement::{Achievement, AchievementError};
use crate::factory::{AchievementFactory, FactoryError};
use crate::handler::HandlerError;
use crate::notify::{Listener, ListenerId, Notifier};
use crate::tick::TickableGroup;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by group operations.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    /// `init` was called twice.
    #[error("group {id} is already initialized")]
    AlreadyInitialized {
        /// The group.
        id: GroupId,
    },

    /// A snapshot belonging to another group was supplied.
    #[error("snapshot id {snapshot} does not match group {expected}")]
    SnapshotMismatch {
        /// Identifier of this group.
        expected: GroupId,
        /// Identifier found in the snapshot.
        snapshot: GroupId,
    },

    /// The snapshot lacks data this group type requires.
    #[error("invalid snapshot for group {id}: {reason}")]
    InvalidSnapshot {
        /// The group.
        id: GroupId,
        /// What is missing or malformed.
        reason: String,
    },

    /// A persisted timestamp could not be parsed.
    #[error("invalid refresh timestamp '{value}' for group {id}: {source}")]
    InvalidTimestamp {
        /// The group.
        id: GroupId,
        /// The unparsable value.
        value: String,
        /// The underlying parse error.
        source: chrono::ParseError,
    },

    /// A timed group was used without a tick registrar.
    #[error("group {id} has no tick registrar")]
    TickRegistrarMissing {
        /// The group.
        id: GroupId,
    },

    /// The group configuration is invalid.
    #[error("invalid configuration for group {id}: {reason}")]
    InvalidConfig {
        /// The group.
        id: GroupId,
        /// Why the configuration was rejected.
        reason: String,
    },

    /// Building an achievement failed.
    #[error("achievement construction failed: {source}")]
    Factory {
        /// The underlying factory error.
        #[from]
        source: FactoryError,
    },

    /// Restoring an achievement failed.
    #[error("achievement error: {source}")]
    Achievement {
        /// The underlying achievement error.
        #[from]
        source: AchievementError,
    },

    /// A membership change was applied to the group but a handler rejected
    /// one of the new members.
    #[error("binding members of group {id} failed: {source}")]
    Binding {
        /// The group.
        id: GroupId,
        /// The handler's rejection.
        source: HandlerError,
    },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A batched membership change.
///
/// Receivers must detach `removed` before attaching `added`: a rotation may
/// remove one achievement and add another built from the same
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    /// Achievements that left the group.
    pub removed: Vec<Rc<Achievement>>,
    /// Achievements that joined the group.
    pub added: Vec<Rc<Achievement>>,
}

impl GroupUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Notification emitted by a group.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    /// Achievements joined and/or left the group.
    MembershipChanged {
        /// The group.
        group: GroupId,
        /// The change, already applied to the group.
        update: GroupUpdate,
    },
    /// A timed group finished a refresh. Always follows the refresh's
    /// membership change.
    Refreshed {
        /// The group.
        group: GroupId,
    },
}

/// Mirrors membership changes outside the group before listeners hear of
/// them. The service installs its handler binder here.
pub trait MembershipSink {
    /// Apply a change the group has already made.
    ///
    /// # Errors
    ///
    /// Returns the [`HandlerError`] of the first rejected achievement.
    fn apply(&self, update: &GroupUpdate) -> Result<(), HandlerError>;
}

// ---------------------------------------------------------------------------
// Configuration sets
// ---------------------------------------------------------------------------

/// A configuration set a group can be built from.
pub trait GroupDefinition {
    /// Group identifier.
    fn id(&self) -> &GroupId;

    /// The declared pool of achievement configurations.
    fn achievement_configs(&self) -> &[AchievementConfig];
}

impl GroupDefinition for SimpleGroupConfig {
    fn id(&self) -> &GroupId {
        &self.id
    }

    fn achievement_configs(&self) -> &[AchievementConfig] {
        &self.achievements
    }
}

impl GroupDefinition for TimedGroupConfig {
    fn id(&self) -> &GroupId {
        &self.id
    }

    fn achievement_configs(&self) -> &[AchievementConfig] {
        &self.achievements
    }
}

// ---------------------------------------------------------------------------
// Group trait
// ---------------------------------------------------------------------------

/// Object-safe view of a group, used by the service to hold static and
/// timed groups side by side.
pub trait Group {
    /// Group identifier.
    fn id(&self) -> &GroupId;

    /// Live achievements, ordered by id.
    fn achievements(&self) -> Vec<Rc<Achievement>>;

    /// Live achievement with the given id.
    fn achievement(&self, id: &AchievementId) -> Option<Rc<Achievement>>;

    /// Whether `init` has run.
    fn is_initialized(&self) -> bool;

    /// One-shot initialization.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::AlreadyInitialized`] on a second call, or the
    /// error of whatever initialization step failed.
    fn init(&self) -> Result<(), GroupError>;

    /// Reconcile live state with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::SnapshotMismatch`] for another group's
    /// snapshot, or the error of the achievement that failed to restore.
    fn restore_state(&self, snapshot: &GroupSnapshot) -> Result<(), GroupError>;

    /// Capture the persisted state of the group.
    fn capture_state(&self) -> GroupSnapshot;

    /// Register a listener for the group's events.
    fn subscribe(&self, listener: Listener<GroupEvent>) -> ListenerId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Install or clear the sink that mirrors membership changes.
    fn set_membership_sink(&self, sink: Option<Rc<dyn MembershipSink>>);

    /// The tick participant view of this group, if it rotates over time.
    fn as_tickable(self: Rc<Self>) -> Option<Rc<dyn TickableGroup>> {
        None
    }

    /// Release every achievement and listener.
    fn dispose(&self);
}

// ---------------------------------------------------------------------------
// AchievementGroup
// ---------------------------------------------------------------------------

/// A keyed collection of achievements built from a configuration set.
pub struct AchievementGroup<C> {
    /// The configuration set.
    config: C,
    /// The declared pool, shared with every achievement built from it.
    pool: Vec<Rc<AchievementConfig>>,
    /// Builds achievements from the pool.
    factory: Rc<AchievementFactory>,
    /// Live achievements by id.
    achievements: RefCell<BTreeMap<AchievementId, Rc<Achievement>>>,
    /// One-shot initialization gate.
    initialized: Cell<bool>,
    /// Listeners for group events.
    events: Notifier<GroupEvent>,
    /// Applied before listeners on every membership change.
    sink: RefCell<Option<Rc<dyn MembershipSink>>>,
}

/// A group whose every declared achievement is live.
pub type SimpleGroup = AchievementGroup<SimpleGroupConfig>;

impl<C: GroupDefinition> AchievementGroup<C> {
    /// Create an empty, uninitialized group.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidConfig`] if the pool declares the same
    /// achievement id twice.
    pub fn new(config: C, factory: Rc<AchievementFactory>) -> Result<Self, GroupError> {
        let mut seen = BTreeSet::new();
        for achievement in config.achievement_configs() {
            if !seen.insert(&achievement.id) {
                return Err(GroupError::InvalidConfig {
                    id: config.id().clone(),
                    reason: format!("duplicate achievement id {}", achievement.id),
                });
            }
        }

        let pool = config
            .achievement_configs()
            .iter()
            .cloned()
            .map(Rc::new)
            .collect();

        Ok(Self {
            config,
            pool,
            factory,
            achievements: RefCell::new(BTreeMap::new()),
            initialized: Cell::new(false),
            events: Notifier::new(),
            sink: RefCell::new(None),
        })
    }

    /// Group identifier.
    pub fn id(&self) -> &GroupId {
        self.config.id()
    }

    /// The configuration set.
    pub const fn config(&self) -> &C {
        &self.config
    }

    /// The declared pool.
    pub fn pool(&self) -> &[Rc<AchievementConfig>] {
        &self.pool
    }

    /// Declared configuration with the given id.
    pub fn config_for(&self, id: &AchievementId) -> Option<&Rc<AchievementConfig>> {
        self.pool.iter().find(|config| config.id == *id)
    }

    /// Live achievement with the given id.
    pub fn achievement(&self, id: &AchievementId) -> Option<Rc<Achievement>> {
        self.achievements.borrow().get(id).cloned()
    }

    /// Live achievements, ordered by id.
    pub fn achievements(&self) -> Vec<Rc<Achievement>> {
        self.achievements.borrow().values().cloned().collect()
    }

    /// Number of live achievements.
    pub fn len(&self) -> usize {
        self.achievements.borrow().len()
    }

    /// Whether the group has no live achievement.
    pub fn is_empty(&self) -> bool {
        self.achievements.borrow().is_empty()
    }

    /// Whether an achievement with the given id is live.
    pub fn contains(&self, id: &AchievementId) -> bool {
        self.achievements.borrow().contains_key(id)
    }

    /// Whether `init` has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Register a listener for the group's events.
    pub fn subscribe(&self, listener: impl Fn(&GroupEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Install or clear the membership sink.
    pub fn set_membership_sink(&self, sink: Option<Rc<dyn MembershipSink>>) {
        *self.sink.borrow_mut() = sink;
    }

    /// Build every declared achievement that is not live yet.
    ///
    /// Achievements restored before initialization are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::AlreadyInitialized`] on a second call,
    /// [`GroupError::Factory`] if an achievement cannot be built, and
    /// [`GroupError::Binding`] if the sink rejects the new members.
    pub fn init(&self) -> Result<(), GroupError> {
        self.mark_initialized()?;

        let mut added = Vec::new();
        for config in &self.pool {
            if self.contains(&config.id) {
                continue;
            }
            let achievement = self.factory.create(config)?;
            self.achievements
                .borrow_mut()
                .insert(config.id.clone(), Rc::clone(&achievement));
            added.push(achievement);
        }

        debug!(group = %self.id(), achievements = self.len(), "Group initialized");
        self.publish(GroupUpdate {
            removed: Vec::new(),
            added,
        })
    }

    /// Reconcile live state with a snapshot. See the module documentation.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::SnapshotMismatch`] for another group's
    /// snapshot, [`GroupError::Factory`] if a declared achievement cannot
    /// be built, and [`GroupError::Binding`] if the sink rejects a rebuilt
    /// achievement.
    pub fn restore_state(&self, snapshot: &GroupSnapshot) -> Result<(), GroupError> {
        if snapshot.id != *self.id() {
            return Err(GroupError::SnapshotMismatch {
                expected: self.id().clone(),
                snapshot: snapshot.id.clone(),
            });
        }

        let mut added = Vec::new();
        for entry in &snapshot.achievements {
            if let Some(achievement) = self.achievement(&entry.id) {
                achievement.restore_state(entry)?;
                continue;
            }

            let Some(config) = self.config_for(&entry.id) else {
                warn!(
                    group = %self.id(),
                    achievement = %entry.id,
                    "Unknown achievement in snapshot, skipping"
                );
                continue;
            };

            let achievement = self.factory.create(config)?;
            achievement.restore_state(entry)?;
            self.achievements
                .borrow_mut()
                .insert(entry.id.clone(), Rc::clone(&achievement));
            added.push(achievement);
        }

        debug!(
            group = %self.id(),
            entries = snapshot.achievements.len(),
            created = added.len(),
            "Group state restored"
        );
        self.publish(GroupUpdate {
            removed: Vec::new(),
            added,
        })
    }

    /// Capture one snapshot entry per live achievement.
    pub fn capture_state(&self) -> GroupSnapshot {
        GroupSnapshot {
            id: self.id().clone(),
            achievements: self
                .achievements
                .borrow()
                .values()
                .map(|achievement| achievement.capture_state())
                .collect(),
            last_refresh_time: None,
        }
    }

    /// Dispose every achievement and drop every listener.
    pub fn dispose(&self) {
        let achievements: Vec<Rc<Achievement>> =
            core::mem::take(&mut *self.achievements.borrow_mut())
                .into_values()
                .collect();
        for achievement in &achievements {
            achievement.dispose();
        }
        self.events.clear();
        self.sink.borrow_mut().take();
        debug!(group = %self.id(), released = achievements.len(), "Group disposed");
    }

    // -----------------------------------------------------------------------
    // Crate-internal building blocks for specialized groups
    // -----------------------------------------------------------------------

    /// Pass the one-shot gate without building anything.
    pub(crate) fn mark_initialized(&self) -> Result<(), GroupError> {
        if self.initialized.get() {
            return Err(GroupError::AlreadyInitialized {
                id: self.id().clone(),
            });
        }
        self.initialized.set(true);
        Ok(())
    }

    /// The factory used to build achievements.
    pub(crate) fn factory(&self) -> &AchievementFactory {
        &self.factory
    }

    /// Replace members: remove first, then add, then publish one change.
    ///
    /// Removed achievements are disposed. The change is kept even when the
    /// sink rejects it.
    pub(crate) fn replace_members(
        &self,
        removed: Vec<Rc<Achievement>>,
        added: Vec<Rc<Achievement>>,
    ) -> Result<(), GroupError> {
        {
            let mut achievements = self.achievements.borrow_mut();
            for achievement in &removed {
                achievements.remove(achievement.id());
            }
            for achievement in &added {
                achievements.insert(achievement.id().clone(), Rc::clone(achievement));
            }
        }
        for achievement in &removed {
            achievement.dispose();
        }
        self.publish(GroupUpdate { removed, added })
    }

    /// Emit an event to the group's listeners.
    pub(crate) fn emit(&self, event: &GroupEvent) {
        self.events.emit(event);
    }

    fn publish(&self, update: GroupUpdate) -> Result<(), GroupError> {
        if update.is_empty() {
            return Ok(());
        }
        let sink = self.sink.borrow().clone();
        let bound = sink.map_or(Ok(()), |sink| sink.apply(&update)).map_err(|source| {
            GroupError::Binding {
                id: self.id().clone(),
                source,
            }
        });
        self.emit(&GroupEvent::MembershipChanged {
            group: self.id().clone(),
            update,
        });
        bound
    }
}

impl<C: GroupDefinition + 'static> Group for AchievementGroup<C> {
    fn id(&self) -> &GroupId {
        Self::id(self)
    }

    fn achievements(&self) -> Vec<Rc<Achievement>> {
        Self::achievements(self)
    }

    fn achievement(&self, id: &AchievementId) -> Option<Rc<Achievement>> {
        Self::achievement(self, id)
    }

    fn is_initialized(&self) -> bool {
        Self::is_initialized(self)
    }

    fn init(&self) -> Result<(), GroupError> {
        Self::init(self)
    }

    fn restore_state(&self, snapshot: &GroupSnapshot) -> Result<(), GroupError> {
        Self::restore_state(self, snapshot)
    }

    fn capture_state(&self) -> GroupSnapshot {
        Self::capture_state(self)
    }

    fn subscribe(&self, listener: Listener<GroupEvent>) -> ListenerId {
        self.events.subscribe(move |event| listener(event))
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        Self::unsubscribe(self, id)
    }

    fn set_membership_sink(&self, sink: Option<Rc<dyn MembershipSink>>) {
        Self::set_membership_sink(self, sink);
    }

    fn dispose(&self) {
        Self::dispose(self);
    }
}

impl<C> core::fmt::Debug for AchievementGroup<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AchievementGroup")
            .field("pool", &self.pool.len())
            .field("achievements", &self.achievements.borrow().keys().collect::<Vec<_>>())
            .field("initialized", &self.initialized.get())
            .finish_non_exhaustive()
    }
}
