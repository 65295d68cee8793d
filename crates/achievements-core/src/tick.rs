//! Tick scheduling for groups that rotate over time.
//!
//! A [`TickableGroup`] asks a [`TickRegistrar`] to be ticked. The host owns
//! the registrar and decides how often ticks happen: a game loop, a tokio
//! interval, or a test driving [`TickScheduler::tick`] by hand. The delta
//! passed to each tick is informational; groups decide on their own clock
//! whether anything is due.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use achievements_types::GroupId;
use tracing::{debug, info};

use crate::group::GroupError;

/// A group that wants to be ticked.
pub trait TickableGroup {
    /// Identifier of the group, used as the registration key.
    fn group_id(&self) -> &GroupId;

    /// Advance the group. Returns `true` if the tick caused a refresh.
    ///
    /// # Errors
    ///
    /// Returns the [`GroupError`] of a refresh that failed.
    fn tick(&self, delta: Duration) -> Result<bool, GroupError>;

    /// Inject the registrar the group registers itself with on init.
    fn set_tick_registrar(&self, registrar: Rc<dyn TickRegistrar>);

    /// The injected registrar, if any.
    fn tick_registrar(&self) -> Option<Rc<dyn TickRegistrar>>;

    /// Whether a registrar has been injected.
    fn has_tick_registrar(&self) -> bool {
        self.tick_registrar().is_some()
    }
}

/// Keeps track of the groups that must be ticked.
pub trait TickRegistrar {
    /// Start ticking `group`. Registering the same group id twice keeps a
    /// single entry.
    fn register(&self, group: Rc<dyn TickableGroup>);

    /// Stop ticking the group with this id. Unknown ids are ignored.
    fn unregister(&self, id: &GroupId);
}

/// In-process registrar driven explicitly by the host.
#[derive(Default)]
pub struct TickScheduler {
    /// Participants in registration order.
    groups: RefCell<Vec<Rc<dyn TickableGroup>>>,
}

impl TickScheduler {
    /// Create a scheduler with no participants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered groups.
    pub fn len(&self) -> usize {
        self.groups.borrow().len()
    }

    /// Whether no group is registered.
    pub fn is_empty(&self) -> bool {
        self.groups.borrow().is_empty()
    }

    /// Whether a group with this id is registered.
    pub fn is_registered(&self, id: &GroupId) -> bool {
        self.groups.borrow().iter().any(|group| group.group_id() == id)
    }

    /// Tick every registered group once.
    ///
    /// Returns the number of groups that refreshed. Groups registered or
    /// unregistered by a refresh take effect on the next call.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first group error.
    pub fn tick(&self, delta: Duration) -> Result<usize, GroupError> {
        let participants: Vec<Rc<dyn TickableGroup>> = self.groups.borrow().clone();

        let mut refreshed: usize = 0;
        for group in participants {
            if group.tick(delta)? {
                refreshed = refreshed.saturating_add(1);
            }
        }

        if refreshed > 0 {
            info!(refreshed, participants = self.len(), "Scheduler tick refreshed groups");
        }
        Ok(refreshed)
    }
}

impl TickRegistrar for TickScheduler {
    fn register(&self, group: Rc<dyn TickableGroup>) {
        let mut groups = self.groups.borrow_mut();
        if groups.iter().any(|existing| existing.group_id() == group.group_id()) {
            return;
        }
        debug!(group = %group.group_id(), "Group registered for ticks");
        groups.push(group);
    }

    fn unregister(&self, id: &GroupId) {
        let mut groups = self.groups.borrow_mut();
        let before = groups.len();
        groups.retain(|group| group.group_id() != id);
        if groups.len() != before {
            debug!(group = %id, "Group unregistered from ticks");
        }
    }
}

impl core::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let ids: Vec<GroupId> = self
            .groups
            .borrow()
            .iter()
            .map(|group| group.group_id().clone())
            .collect();
        f.debug_struct("TickScheduler").field("groups", &ids).finish()
    }
}
