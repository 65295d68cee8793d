//! Groups whose active set rotates on a fixed interval.
//!
//! A [`TimedGroup`] declares a pool of configurations and keeps at most
//! `active_count` of them live at a time ("daily quests"). When the refresh
//! interval has elapsed, the next tick replaces the active set with a fresh
//! uniform sample of the pool.
//!
//! # Rotation
//!
//! 1. With `retain_unclaimed`, active achievements that are completed but
//!    not yet claimed survive the rotation. Everything else is removed.
//! 2. `min(active_count, pool)` configurations are sampled without
//!    replacement. Sampled configurations already retained are not rebuilt.
//! 3. Removed achievements leave the group before added ones join, and the
//!    whole change is published as one membership update.
//! 4. The refresh time is reset and [`GroupEvent::Refreshed`] follows.
//!
//! A tick checks the threshold once. A group that slept through several
//! intervals refreshes once, not once per missed interval.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use std::time::Duration;

use achievements_types::{AchievementId, GroupId, GroupSnapshot, TimedGroupConfig};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rand::RngCore;
use rand::seq::index;
use tracing::{debug, info};

use crate::achievement::Achievement;
use crate::clock::{Clock, SystemClock};
use crate::factory::AchievementFactory;
use crate::group::{AchievementGroup, Group, GroupError, GroupEvent, MembershipSink};
use crate::notify::{Listener, ListenerId};
use crate::tick::{TickRegistrar, TickableGroup};

/// A group that periodically draws a new active set from its pool.
pub struct TimedGroup {
    /// Pool, live members, and events.
    base: AchievementGroup<TimedGroupConfig>,
    /// Handle to the owning `Rc`, used to register for ticks.
    this: Weak<Self>,
    /// Minimum time between refreshes.
    refresh_interval: TimeDelta,
    /// Time of the last refresh (or of construction).
    last_refresh_time: Cell<DateTime<Utc>>,
    /// Time source.
    clock: Rc<dyn Clock>,
    /// Random source for sampling.
    rng: RefCell<Box<dyn RngCore>>,
    /// Registrar the group registers itself with on init.
    registrar: RefCell<Option<Rc<dyn TickRegistrar>>>,
}

impl TimedGroup {
    /// Create a timed group on the system clock and the thread-local RNG.
    ///
    /// # Errors
    ///
    /// See [`with_sources`](Self::with_sources).
    pub fn new(
        config: TimedGroupConfig,
        factory: Rc<AchievementFactory>,
    ) -> Result<Rc<Self>, GroupError> {
        Self::with_sources(config, factory, Rc::new(SystemClock), Box::new(rand::rng()))
    }

    /// Create a timed group with an explicit clock and random source.
    ///
    /// The last refresh time starts at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidConfig`] for a zero `active_count`, a
    /// zero or unrepresentable refresh interval, or duplicate ids in the
    /// pool.
    pub fn with_sources(
        config: TimedGroupConfig,
        factory: Rc<AchievementFactory>,
        clock: Rc<dyn Clock>,
        rng: Box<dyn RngCore>,
    ) -> Result<Rc<Self>, GroupError> {
        if config.active_count == 0 {
            return Err(GroupError::InvalidConfig {
                id: config.id,
                reason: "active_count must be positive".to_owned(),
            });
        }
        let refresh_interval = i64::try_from(config.refresh_interval_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| GroupError::InvalidConfig {
                id: config.id.clone(),
                reason: format!(
                    "refresh interval of {}s is not a positive duration",
                    config.refresh_interval_secs
                ),
            })?;

        let base = AchievementGroup::new(config, factory)?;
        let started = clock.now();

        Ok(Rc::new_cyclic(|this| Self {
            base,
            this: Weak::clone(this),
            refresh_interval,
            last_refresh_time: Cell::new(started),
            clock,
            rng: RefCell::new(rng),
            registrar: RefCell::new(None),
        }))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Group identifier.
    pub fn id(&self) -> &GroupId {
        self.base.id()
    }

    /// The configuration set.
    pub const fn config(&self) -> &TimedGroupConfig {
        self.base.config()
    }

    /// Maximum number of sampled achievements per refresh.
    pub const fn active_count(&self) -> u32 {
        self.base.config().active_count
    }

    /// Whether completed, unclaimed achievements survive a refresh.
    pub const fn retain_unclaimed(&self) -> bool {
        self.base.config().retain_unclaimed
    }

    /// Minimum time between refreshes.
    pub const fn refresh_interval(&self) -> TimeDelta {
        self.refresh_interval
    }

    /// Time of the last refresh.
    pub fn last_refresh_time(&self) -> DateTime<Utc> {
        self.last_refresh_time.get()
    }

    /// Time elapsed since the last refresh.
    pub fn calculate_time_from_last_refresh(&self) -> TimeDelta {
        self.clock
            .now()
            .signed_duration_since(self.last_refresh_time.get())
    }

    /// Time left before the next refresh is due. Negative when overdue.
    pub fn calculate_time_to_refresh(&self) -> TimeDelta {
        self.refresh_interval
            .checked_sub(&self.calculate_time_from_last_refresh())
            .unwrap_or(TimeDelta::MIN)
    }

    /// Whether the refresh interval has elapsed.
    pub fn is_refresh_due(&self) -> bool {
        self.calculate_time_from_last_refresh() >= self.refresh_interval
    }

    /// Live achievement with the given id.
    pub fn achievement(&self, id: &AchievementId) -> Option<Rc<Achievement>> {
        self.base.achievement(id)
    }

    /// The active set, ordered by id.
    pub fn achievements(&self) -> Vec<Rc<Achievement>> {
        self.base.achievements()
    }

    /// Number of active achievements.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Whether the active set is empty.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Whether `init` has run.
    pub fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    /// Register a listener for the group's events.
    pub fn subscribe(&self, listener: impl Fn(&GroupEvent) + 'static) -> ListenerId {
        self.base.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.base.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// One-shot initialization: register with the tick registrar.
    ///
    /// The active set is left as it is. It is first populated by a refresh
    /// or by restoring a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::TickRegistrarMissing`] if no registrar was
    /// injected and [`GroupError::AlreadyInitialized`] on a second call.
    pub fn init(&self) -> Result<(), GroupError> {
        let Some(registrar) = self.registrar.borrow().clone() else {
            return Err(GroupError::TickRegistrarMissing {
                id: self.id().clone(),
            });
        };
        self.base.mark_initialized()?;

        if let Some(this) = self.this.upgrade() {
            registrar.register(this);
        }
        debug!(
            group = %self.id(),
            pool = self.base.pool().len(),
            active_count = self.active_count(),
            "Timed group initialized"
        );
        Ok(())
    }

    /// Refresh if the interval has elapsed. Returns whether it refreshed.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed refresh.
    pub fn tick(&self, delta: Duration) -> Result<bool, GroupError> {
        if !self.is_refresh_due() {
            return Ok(false);
        }
        debug!(
            group = %self.id(),
            delta_ms = delta.as_millis(),
            overdue_secs = self
                .calculate_time_from_last_refresh()
                .checked_sub(&self.refresh_interval)
                .map_or(i64::MAX, |overdue| overdue.num_seconds()),
            "Refresh due"
        );
        self.force_refresh()?;
        Ok(true)
    }

    /// Rotate the active set now, regardless of the interval.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Factory`] if a sampled configuration cannot be
    /// built. The active set is unchanged in that case.
    ///
    /// Returns [`GroupError::Binding`] if a handler rejected one of the new
    /// members. The rotation itself is kept: the refresh time is reset and
    /// [`GroupEvent::Refreshed`] is still emitted.
    pub fn force_refresh(&self) -> Result<(), GroupError> {
        let (retained, removed): (Vec<Rc<Achievement>>, Vec<Rc<Achievement>>) = self
            .base
            .achievements()
            .into_iter()
            .partition(|achievement| self.retain_unclaimed() && achievement.is_claimable());
        let retained_ids: BTreeSet<AchievementId> = retained
            .iter()
            .map(|achievement| achievement.id().clone())
            .collect();

        let pool = self.base.pool();
        let wanted = usize::try_from(self.active_count())
            .unwrap_or(usize::MAX)
            .min(pool.len());
        let picks = {
            let mut rng = self.rng.borrow_mut();
            index::sample(&mut **rng, pool.len(), wanted)
        };

        let mut added = Vec::with_capacity(picks.len());
        for pick in picks.iter() {
            let Some(config) = pool.get(pick) else {
                continue;
            };
            if retained_ids.contains(&config.id) {
                continue;
            }
            added.push(self.base.factory().create(config)?);
        }

        info!(
            group = %self.id(),
            retained = retained.len(),
            removed = removed.len(),
            added = added.len(),
            "Timed group refreshed"
        );
        let bound = self.base.replace_members(removed, added);
        self.last_refresh_time.set(self.clock.now());
        self.base.emit(&GroupEvent::Refreshed {
            group: self.id().clone(),
        });
        bound
    }

    /// Reconcile the active set and the refresh time with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidSnapshot`] when the snapshot has no
    /// refresh time, [`GroupError::InvalidTimestamp`] when it cannot be
    /// parsed, and the base group errors otherwise. Nothing is changed when
    /// the timestamp is rejected.
    pub fn restore_state(&self, snapshot: &GroupSnapshot) -> Result<(), GroupError> {
        if snapshot.id != *self.id() {
            return Err(GroupError::SnapshotMismatch {
                expected: self.id().clone(),
                snapshot: snapshot.id.clone(),
            });
        }
        let Some(value) = snapshot.last_refresh_time.as_deref() else {
            return Err(GroupError::InvalidSnapshot {
                id: self.id().clone(),
                reason: "missing last refresh time".to_owned(),
            });
        };
        let last_refresh = DateTime::parse_from_rfc3339(value)
            .map_err(|source| GroupError::InvalidTimestamp {
                id: self.id().clone(),
                value: value.to_owned(),
                source,
            })?
            .with_timezone(&Utc);

        self.base.restore_state(snapshot)?;
        self.last_refresh_time.set(last_refresh);
        Ok(())
    }

    /// Capture the active set and the refresh time.
    pub fn capture_state(&self) -> GroupSnapshot {
        let mut snapshot = self.base.capture_state();
        snapshot.last_refresh_time = Some(
            self.last_refresh_time
                .get()
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
        snapshot
    }

    /// Unregister from ticks, then dispose every achievement and listener.
    pub fn dispose(&self) {
        if let Some(registrar) = self.registrar.borrow().as_ref() {
            registrar.unregister(self.id());
        }
        self.base.dispose();
    }
}

impl TickableGroup for TimedGroup {
    fn group_id(&self) -> &GroupId {
        self.id()
    }

    fn tick(&self, delta: Duration) -> Result<bool, GroupError> {
        Self::tick(self, delta)
    }

    fn set_tick_registrar(&self, registrar: Rc<dyn TickRegistrar>) {
        *self.registrar.borrow_mut() = Some(registrar);
    }

    fn tick_registrar(&self) -> Option<Rc<dyn TickRegistrar>> {
        self.registrar.borrow().clone()
    }
}

impl Group for TimedGroup {
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
        self.base.subscribe(move |event| listener(event))
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        Self::unsubscribe(self, id)
    }

    fn set_membership_sink(&self, sink: Option<Rc<dyn MembershipSink>>) {
        self.base.set_membership_sink(sink);
    }

    fn as_tickable(self: Rc<Self>) -> Option<Rc<dyn TickableGroup>> {
        Some(self)
    }

    fn dispose(&self) {
        Self::dispose(self);
    }
}

impl core::fmt::Debug for TimedGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimedGroup")
            .field("base", &self.base)
            .field("refresh_interval", &self.refresh_interval)
            .field("last_refresh_time", &self.last_refresh_time.get())
            .field("has_registrar", &self.has_tick_registrar())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use achievements_types::{AchievementConfig, RewardConfig, RewardKind};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::clock::ManualClock;
    use crate::reward::{RewardDispenser, RewardError};
    use crate::tick::TickScheduler;

    struct NullDispenser(RewardKind);

    impl RewardDispenser for NullDispenser {
        fn target_kind(&self) -> &RewardKind {
            &self.0
        }

        fn dispense(&self, _reward: &RewardConfig) -> Result<(), RewardError> {
            Ok(())
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn daily(pool: usize, active_count: u32, retain_unclaimed: bool) -> TimedGroupConfig {
        TimedGroupConfig {
            id: GroupId::new("daily"),
            achievements: (0..pool)
                .map(|index| {
                    AchievementConfig::new(
                        format!("quest_{index}"),
                        "quests",
                        1,
                        RewardConfig::new("coins", 5),
                    )
                })
                .collect(),
            active_count,
            refresh_interval_secs: 60,
            retain_unclaimed,
        }
    }

    fn build(config: TimedGroupConfig) -> (Rc<TimedGroup>, Rc<ManualClock>) {
        let mut factory = AchievementFactory::new();
        factory
            .register_dispenser(Rc::new(NullDispenser(RewardKind::new("coins"))))
            .unwrap();
        let clock = Rc::new(ManualClock::new(start()));
        let group = TimedGroup::with_sources(
            config,
            Rc::new(factory),
            Rc::clone(&clock) as Rc<dyn Clock>,
            Box::new(SmallRng::seed_from_u64(7)),
        )
        .unwrap();
        (group, clock)
    }

    #[test]
    fn init_requires_registrar_and_registers() {
        let (group, _) = build(daily(5, 2, true));
        assert!(matches!(
            group.init(),
            Err(GroupError::TickRegistrarMissing { .. })
        ));

        let scheduler = Rc::new(TickScheduler::new());
        group.set_tick_registrar(Rc::clone(&scheduler) as Rc<dyn TickRegistrar>);
        group.init().unwrap();
        assert!(scheduler.is_registered(&GroupId::new("daily")));
        assert!(group.is_empty());

        group.dispose();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn tick_refreshes_only_when_due() {
        let (group, clock) = build(daily(5, 2, true));
        assert!(!group.tick(Duration::from_secs(1)).unwrap());

        clock.advance(TimeDelta::seconds(59));
        assert!(!group.tick(Duration::from_secs(59)).unwrap());
        assert_eq!(group.calculate_time_to_refresh(), TimeDelta::seconds(1));

        clock.advance(TimeDelta::seconds(1));
        assert!(group.tick(Duration::from_secs(1)).unwrap());
        assert_eq!(group.len(), 2);
        assert_eq!(group.last_refresh_time(), clock.now());
    }

    #[test]
    fn sample_is_capped_by_pool_size() {
        let (group, _) = build(daily(2, 5, false));
        group.force_refresh().unwrap();
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn refresh_publishes_membership_before_refreshed() {
        let (group, _) = build(daily(5, 2, false));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        group.subscribe(move |event| {
            sink.borrow_mut().push(match event {
                GroupEvent::MembershipChanged { .. } => "membership",
                GroupEvent::Refreshed { .. } => "refreshed",
            });
        });

        group.force_refresh().unwrap();
        assert_eq!(*log.borrow(), vec!["membership", "refreshed"]);
    }

    #[test]
    fn snapshot_requires_valid_timestamp() {
        let (group, clock) = build(daily(5, 2, true));
        group.force_refresh().unwrap();
        clock.advance(TimeDelta::seconds(30));
        let snapshot = group.capture_state();
        assert_eq!(
            snapshot.last_refresh_time.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );

        let (restored, _) = build(daily(5, 2, true));
        restored.restore_state(&snapshot).unwrap();
        assert_eq!(restored.last_refresh_time(), start());
        assert_eq!(restored.capture_state(), snapshot);

        let mut missing = snapshot.clone();
        missing.last_refresh_time = None;
        assert!(matches!(
            restored.restore_state(&missing),
            Err(GroupError::InvalidSnapshot { .. })
        ));

        let mut garbled = snapshot;
        garbled.last_refresh_time = Some("yesterday".to_owned());
        assert!(matches!(
            restored.restore_state(&garbled),
            Err(GroupError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn zero_active_count_is_rejected() {
        let mut factory = AchievementFactory::new();
        factory
            .register_dispenser(Rc::new(NullDispenser(RewardKind::new("coins"))))
            .unwrap();
        assert!(matches!(
            TimedGroup::new(daily(3, 0, true), Rc::new(factory)),
            Err(GroupError::InvalidConfig { .. })
        ));
    }
}
