//! Integration tests for timed group rotation driven through the service.
//!
//! Time is controlled with `ManualClock` and sampling with a seeded
//! `SmallRng`, so every run sees the same rotations.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use achievements_core::{
    Achievement, AchievementFactory, AchievementHandler, AchievementsService, Clock, Group,
    GroupError, GroupEvent, HandlerError, ManualClock, ProgressHandler, RewardDispenser,
    RewardError, ServiceError, TickRegistrar, TickScheduler, TickableGroup, TimedGroup,
};
use achievements_types::{
    AchievementConfig, AchievementId, ConfigKind, GroupId, RewardConfig, RewardKind,
    ServiceSnapshot, TimedGroupConfig,
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;

struct CoinDispenser(RewardKind);

impl RewardDispenser for CoinDispenser {
    fn target_kind(&self) -> &RewardKind {
        &self.0
    }

    fn dispense(&self, _reward: &RewardConfig) -> Result<(), RewardError> {
        Ok(())
    }
}

struct Fixture {
    service: AchievementsService,
    scheduler: Rc<TickScheduler>,
    clock: Rc<ManualClock>,
    group: Rc<TimedGroup>,
    kills: Rc<ProgressHandler>,
    distance: Rc<ProgressHandler>,
}

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Five daily quests, two active at a time, refreshed every minute.
fn daily_config(retain_unclaimed: bool) -> TimedGroupConfig {
    let kinds = ["kills", "distance", "kills", "distance", "kills"];
    TimedGroupConfig {
        id: GroupId::new("daily"),
        achievements: kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| {
                AchievementConfig::new(
                    format!("daily_{index}"),
                    *kind,
                    1,
                    RewardConfig::new("coins", 20),
                )
            })
            .collect(),
        active_count: 2,
        refresh_interval_secs: 60,
        retain_unclaimed,
    }
}

fn factory() -> Rc<AchievementFactory> {
    let mut factory = AchievementFactory::new();
    factory
        .register_dispenser(Rc::new(CoinDispenser(RewardKind::new("coins"))))
        .unwrap();
    Rc::new(factory)
}

fn daily_group(
    factory: &Rc<AchievementFactory>,
    clock: &Rc<ManualClock>,
    retain_unclaimed: bool,
    seed: u64,
) -> Rc<TimedGroup> {
    TimedGroup::with_sources(
        daily_config(retain_unclaimed),
        Rc::clone(factory),
        Rc::clone(clock) as Rc<dyn Clock>,
        Box::new(SmallRng::seed_from_u64(seed)),
    )
    .unwrap()
}

fn fixture(retain_unclaimed: bool, seed: u64) -> Fixture {
    let factory = factory();
    let clock = Rc::new(ManualClock::new(start()));
    let scheduler = Rc::new(TickScheduler::new());
    let group = daily_group(&factory, &clock, retain_unclaimed, seed);

    let kills = Rc::new(ProgressHandler::new("kills"));
    let distance = Rc::new(ProgressHandler::new("distance"));

    let mut service = AchievementsService::new(factory);
    service.set_tick_registrar(Rc::clone(&scheduler) as Rc<dyn TickRegistrar>);
    service
        .add_handler(Rc::clone(&kills) as Rc<dyn AchievementHandler>)
        .unwrap();
    service
        .add_handler(Rc::clone(&distance) as Rc<dyn AchievementHandler>)
        .unwrap();
    service
        .add_group(Rc::clone(&group) as Rc<dyn Group>)
        .unwrap();

    Fixture {
        service,
        scheduler,
        clock,
        group,
        kills,
        distance,
    }
}

fn ids(achievements: &[Rc<Achievement>]) -> BTreeSet<AchievementId> {
    achievements
        .iter()
        .map(|achievement| achievement.id().clone())
        .collect()
}

/// Removed and added ids of every membership change, in order.
type MembershipLog = Rc<RefCell<Vec<(BTreeSet<AchievementId>, BTreeSet<AchievementId>)>>>;

fn record_membership(group: &TimedGroup) -> MembershipLog {
    let log: MembershipLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    group.subscribe(move |event| {
        if let GroupEvent::MembershipChanged { update, .. } = event {
            sink.borrow_mut()
                .push((ids(&update.removed), ids(&update.added)));
        }
    });
    log
}

/// Refuses every achievement it is offered.
struct RejectingHandler(ConfigKind);

impl AchievementHandler for RejectingHandler {
    fn target_kind(&self) -> &ConfigKind {
        &self.0
    }

    fn has_achievement(&self, _achievement: &Achievement) -> bool {
        false
    }

    fn add_achievement(&self, achievement: Rc<Achievement>) -> Result<(), HandlerError> {
        Err(HandlerError::Duplicate {
            handler: self.0.clone(),
            achievement: achievement.id().clone(),
        })
    }

    fn remove_achievement(&self, _achievement: &Achievement) -> bool {
        false
    }

    fn remove_all_achievements(&self) {}
}

fn assert_handlers_mirror_group(fixture: &Fixture) {
    let members = fixture.group.achievements();
    assert_eq!(
        fixture.kills.len().saturating_add(fixture.distance.len()),
        members.len(),
        "handlers hold exactly the active set"
    );
    for member in &members {
        let handler = if member.kind().as_str() == "kills" {
            &fixture.kills
        } else {
            &fixture.distance
        };
        assert!(handler.has_achievement(member));
    }
}

#[test]
fn group_is_registered_on_add_and_empty_until_first_refresh() {
    let mut fixture = fixture(true, 1);
    assert!(fixture.scheduler.is_registered(&GroupId::new("daily")));

    fixture.service.init().unwrap();
    assert!(fixture.group.is_empty());

    fixture.clock.advance(TimeDelta::seconds(30));
    assert_eq!(fixture.scheduler.tick(Duration::from_secs(30)).unwrap(), 0);
    assert!(fixture.group.is_empty());
}

#[test]
fn overdue_group_refreshes_once_without_catch_up() {
    let mut fixture = fixture(true, 2);
    fixture.service.init().unwrap();

    let refreshes = Rc::new(std::cell::Cell::new(0_u32));
    let counter = Rc::clone(&refreshes);
    fixture.group.subscribe(move |event| {
        if matches!(event, GroupEvent::Refreshed { .. }) {
            counter.set(counter.get().saturating_add(1));
        }
    });

    let membership = record_membership(&fixture.group);

    fixture.clock.advance(TimeDelta::seconds(120));
    assert_eq!(fixture.scheduler.tick(Duration::from_secs(120)).unwrap(), 1);
    assert_eq!(fixture.scheduler.tick(Duration::ZERO).unwrap(), 0);

    assert_eq!(refreshes.get(), 1);
    assert_eq!(membership.borrow().len(), 1);
    assert_eq!(fixture.group.len(), 2);
    assert_eq!(fixture.group.last_refresh_time(), fixture.clock.now());
    assert_handlers_mirror_group(&fixture);
}

#[test]
fn handlers_follow_every_rotation() {
    let mut fixture = fixture(false, 3);
    fixture.service.init().unwrap();

    for _ in 0..5 {
        fixture.clock.advance(TimeDelta::seconds(60));
        assert_eq!(fixture.scheduler.tick(Duration::from_secs(60)).unwrap(), 1);
        assert_eq!(fixture.group.len(), 2);
        assert_handlers_mirror_group(&fixture);
    }
}

#[test]
fn unclaimed_completion_survives_rotation() {
    let mut fixture = fixture(true, 4);
    fixture.service.init().unwrap();
    fixture.group.force_refresh().unwrap();

    let completed = fixture.group.achievements().into_iter().next().unwrap();
    completed.add_progress(1).unwrap();
    assert!(completed.is_claimable());

    fixture.clock.advance(TimeDelta::seconds(60));
    assert_eq!(fixture.scheduler.tick(Duration::from_secs(60)).unwrap(), 1);

    let kept = fixture.group.achievement(completed.id()).unwrap();
    assert!(Rc::ptr_eq(&kept, &completed));
    assert!(kept.is_claimable());
    assert!((2..=3).contains(&fixture.group.len()));
    assert_handlers_mirror_group(&fixture);

    kept.dispense_reward().unwrap();
}

#[test]
fn claimed_or_open_achievements_are_replaced() {
    let mut fixture = fixture(true, 5);
    fixture.service.init().unwrap();
    fixture.group.force_refresh().unwrap();

    let before = fixture.group.achievements();
    let claimed = before.first().unwrap();
    claimed.add_progress(1).unwrap();
    claimed.dispense_reward().unwrap();

    fixture.group.force_refresh().unwrap();
    assert_eq!(fixture.group.len(), 2);
    for old in &before {
        if let Some(current) = fixture.group.achievement(old.id()) {
            assert!(!Rc::ptr_eq(&current, old));
            assert_eq!(current.progress(), 0);
        }
        assert!(!fixture.kills.has_achievement(old));
        assert!(!fixture.distance.has_achievement(old));
    }
}

#[test]
fn retain_disabled_drops_unclaimed_completion() {
    let mut fixture = fixture(false, 6);
    fixture.service.init().unwrap();
    fixture.group.force_refresh().unwrap();

    let completed = fixture.group.achievements().into_iter().next().unwrap();
    completed.add_progress(1).unwrap();

    fixture.group.force_refresh().unwrap();
    assert_eq!(fixture.group.len(), 2);
    if let Some(current) = fixture.group.achievement(completed.id()) {
        assert!(!Rc::ptr_eq(&current, &completed));
        assert!(!current.is_completed());
    }
}

#[test]
fn snapshot_restores_active_set_and_refresh_time() {
    let mut source = fixture(true, 7);
    source.service.init().unwrap();
    source.clock.advance(TimeDelta::seconds(60));
    source.scheduler.tick(Duration::from_secs(60)).unwrap();
    let active: Vec<AchievementId> = source
        .group
        .achievements()
        .iter()
        .map(|achievement| achievement.id().clone())
        .collect();
    source
        .group
        .achievement(active.first().unwrap())
        .unwrap()
        .add_progress(1)
        .unwrap();

    let json = serde_json::to_string(&source.service.capture_state()).unwrap();
    let snapshot: ServiceSnapshot = serde_json::from_str(&json).unwrap();

    let mut restored = fixture(true, 99);
    restored.service.restore_state(&snapshot).unwrap();
    restored.service.init().unwrap();

    let restored_ids: Vec<AchievementId> = restored
        .group
        .achievements()
        .iter()
        .map(|achievement| achievement.id().clone())
        .collect();
    assert_eq!(restored_ids, active);
    assert_eq!(restored.group.last_refresh_time(), source.clock.now());
    assert_eq!(restored.service.capture_state(), snapshot);
    assert_handlers_mirror_group(&restored);

    // Not due yet: the restored refresh time is one minute after the start.
    assert_eq!(restored.scheduler.tick(Duration::from_secs(1)).unwrap(), 0);
}

#[test]
fn removing_the_group_unregisters_and_unbinds() {
    let mut fixture = fixture(true, 8);
    fixture.service.init().unwrap();
    fixture.group.force_refresh().unwrap();

    assert!(fixture.service.remove_group(&GroupId::new("daily")));
    assert!(fixture.scheduler.is_empty());
    assert!(fixture.kills.is_empty());
    assert!(fixture.distance.is_empty());
    assert!(fixture.group.is_empty());
}

#[test]
fn refresh_publishes_one_batched_membership_change() {
    let mut fixture = fixture(true, 9);
    fixture.service.init().unwrap();
    let log = record_membership(&fixture.group);

    fixture.group.force_refresh().unwrap();
    let first = ids(&fixture.group.achievements());
    {
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let (removed, added) = log.first().unwrap();
        assert!(removed.is_empty());
        assert_eq!(*added, first);
        assert_eq!(added.len(), 2);
    }

    let completed = fixture.group.achievements().into_iter().next().unwrap();
    completed.add_progress(1).unwrap();
    let retained: BTreeSet<AchievementId> = [completed.id().clone()].into();

    fixture.clock.advance(TimeDelta::seconds(60));
    assert_eq!(fixture.scheduler.tick(Duration::from_secs(60)).unwrap(), 1);

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    let (removed, added) = log.get(1).unwrap();
    let expected_removed: BTreeSet<AchievementId> =
        first.difference(&retained).cloned().collect();
    assert_eq!(*removed, expected_removed);
    assert!(added.is_disjoint(&retained));
    assert!((1..=2).contains(&added.len()));

    let current = ids(&fixture.group.achievements());
    let expected_current: BTreeSet<AchievementId> = retained.union(added).cloned().collect();
    assert_eq!(current, expected_current);
}

#[test]
fn rotation_without_retention_replaces_the_whole_set() {
    let mut fixture = fixture(false, 10);
    fixture.service.init().unwrap();
    fixture.group.force_refresh().unwrap();
    let before = ids(&fixture.group.achievements());
    let log = record_membership(&fixture.group);

    fixture.group.force_refresh().unwrap();
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    let (removed, added) = log.first().unwrap();
    assert_eq!(*removed, before);
    assert_eq!(added.len(), 2);
    assert_eq!(*added, ids(&fixture.group.achievements()));
}

#[test]
fn group_with_own_registrar_is_registered_on_add() {
    let factory = factory();
    let clock = Rc::new(ManualClock::new(start()));
    let shared = Rc::new(TickScheduler::new());
    let own = Rc::new(TickScheduler::new());
    let group = daily_group(&factory, &clock, true, 11);
    group.set_tick_registrar(Rc::clone(&own) as Rc<dyn TickRegistrar>);

    let mut service = AchievementsService::new(factory);
    service.set_tick_registrar(Rc::clone(&shared) as Rc<dyn TickRegistrar>);
    service
        .add_group(Rc::clone(&group) as Rc<dyn Group>)
        .unwrap();
    assert!(own.is_registered(&GroupId::new("daily")));
    assert!(shared.is_empty());

    service.init().unwrap();
    clock.advance(TimeDelta::seconds(61));
    assert_eq!(own.tick(Duration::from_secs(61)).unwrap(), 1);
    assert_eq!(group.len(), 2);

    assert!(service.remove_group(&GroupId::new("daily")));
    assert!(own.is_empty());
}

#[test]
fn timed_group_without_any_registrar_is_rejected() {
    let factory = factory();
    let clock = Rc::new(ManualClock::new(start()));
    let group = daily_group(&factory, &clock, true, 12);

    let mut service = AchievementsService::new(factory);
    assert!(matches!(
        service.add_group(group as Rc<dyn Group>),
        Err(ServiceError::TickRegistrarMissing { .. })
    ));
    assert!(service.groups().is_empty());
}

#[test]
fn rejected_binding_fails_the_refresh() {
    let factory = factory();
    let clock = Rc::new(ManualClock::new(start()));
    let scheduler = Rc::new(TickScheduler::new());
    let group = daily_group(&factory, &clock, false, 13);

    let mut service = AchievementsService::new(factory);
    service.set_tick_registrar(Rc::clone(&scheduler) as Rc<dyn TickRegistrar>);
    for kind in ["kills", "distance"] {
        service
            .add_handler(Rc::new(RejectingHandler(ConfigKind::new(kind))))
            .unwrap();
    }
    service
        .add_group(Rc::clone(&group) as Rc<dyn Group>)
        .unwrap();
    service.init().unwrap();

    assert!(matches!(
        group.force_refresh(),
        Err(GroupError::Binding { .. })
    ));
    // The rotation itself is kept.
    assert_eq!(group.len(), 2);
    assert_eq!(group.last_refresh_time(), clock.now());

    clock.advance(TimeDelta::seconds(60));
    assert!(matches!(
        scheduler.tick(Duration::from_secs(60)),
        Err(GroupError::Binding { .. })
    ));
}
