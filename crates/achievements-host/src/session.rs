//! A running achievements session.
//!
//! [`Session`] wires a catalog into an [`AchievementsService`]: one
//! [`LedgerDispenser`] per reward kind, one [`ProgressHandler`] per
//! configuration kind, and a [`TickScheduler`] for the timed groups. The
//! console loop in `main` only parses commands and hands them here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use achievements_core::{
    AchievementCatalog, AchievementFactory, AchievementHandler, AchievementsService, Group,
    ProgressHandler, RewardDispenser, SimpleGroup, TickRegistrar, TickScheduler, TimedGroup,
};
use achievements_types::{ConfigKind, GroupId, RewardKind, ServiceSnapshot};
use tracing::info;

use crate::command::Command;
use crate::dispenser::LedgerDispenser;
use crate::error::HostError;

/// What the console loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands.
    Continue,
    /// Save and exit.
    Quit,
}

/// Service, scheduler, and capabilities built from one catalog.
pub struct Session {
    service: AchievementsService,
    scheduler: Rc<TickScheduler>,
    timed_groups: BTreeMap<GroupId, Rc<TimedGroup>>,
    handlers: BTreeMap<ConfigKind, Rc<ProgressHandler>>,
    dispensers: BTreeMap<RewardKind, Rc<LedgerDispenser>>,
    snapshot_path: PathBuf,
}

impl Session {
    /// Build an uninitialized session for `catalog`.
    pub fn build(catalog: &AchievementCatalog, snapshot_path: PathBuf) -> Result<Self, HostError> {
        let configs = catalog
            .achievements
            .iter()
            .chain(catalog.groups.iter().flat_map(|group| &group.achievements))
            .chain(catalog.timed_groups.iter().flat_map(|group| &group.achievements));

        let mut dispensers = BTreeMap::new();
        let mut handlers = BTreeMap::new();
        for config in configs {
            dispensers
                .entry(config.reward.kind.clone())
                .or_insert_with(|| Rc::new(LedgerDispenser::new(config.reward.kind.clone())));
            handlers
                .entry(config.kind.clone())
                .or_insert_with(|| Rc::new(ProgressHandler::new(config.kind.clone())));
        }

        let mut factory = AchievementFactory::new();
        for dispenser in dispensers.values() {
            factory.register_dispenser(Rc::clone(dispenser) as Rc<dyn RewardDispenser>)?;
        }
        let factory = Rc::new(factory);

        let scheduler = Rc::new(TickScheduler::new());
        let mut service = AchievementsService::new(Rc::clone(&factory));
        service.set_tick_registrar(Rc::clone(&scheduler) as Rc<dyn TickRegistrar>);
        for handler in handlers.values() {
            service.add_handler(Rc::clone(handler) as Rc<dyn AchievementHandler>)?;
        }

        service.add_achievements_by_config(catalog.achievements.iter().cloned())?;
        for config in &catalog.groups {
            let group = SimpleGroup::new(config.clone(), Rc::clone(&factory))?;
            service.add_group(Rc::new(group))?;
        }
        let mut timed_groups = BTreeMap::new();
        for config in &catalog.timed_groups {
            let group = TimedGroup::new(config.clone(), Rc::clone(&factory))?;
            service.add_group(Rc::clone(&group) as Rc<dyn Group>)?;
            timed_groups.insert(config.id.clone(), group);
        }

        info!(
            achievements = catalog.len(),
            handlers = handlers.len(),
            dispensers = dispensers.len(),
            timed_groups = timed_groups.len(),
            "Session built"
        );
        Ok(Self {
            service,
            scheduler,
            timed_groups,
            handlers,
            dispensers,
            snapshot_path,
        })
    }

    /// Restore the snapshot file, if it exists. Returns whether it did.
    pub fn load_snapshot(&self) -> Result<bool, HostError> {
        if !self.snapshot_path.exists() {
            info!(path = %self.snapshot_path.display(), "No snapshot file, starting fresh");
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&self.snapshot_path)?;
        let snapshot: ServiceSnapshot = serde_json::from_str(&contents)?;
        self.service.restore_state(&snapshot)?;
        info!(path = %self.snapshot_path.display(), "Snapshot restored");
        Ok(true)
    }

    /// Write the current state to the snapshot file.
    pub fn save_snapshot(&self) -> Result<(), HostError> {
        let json = serde_json::to_string_pretty(&self.service.capture_state())?;
        std::fs::write(&self.snapshot_path, json)?;
        info!(path = %self.snapshot_path.display(), "Snapshot saved");
        Ok(())
    }

    /// Initialize the service.
    pub fn init(&mut self) -> Result<(), HostError> {
        self.service.init()?;
        Ok(())
    }

    /// Tick every timed group. Returns how many refreshed.
    pub fn tick(&self, delta: Duration) -> Result<usize, HostError> {
        Ok(self.scheduler.tick(delta)?)
    }

    /// Run one console command.
    pub fn execute(&self, command: Command) -> Result<Flow, HostError> {
        match command {
            Command::Progress { kind, amount } => {
                let Some(handler) = self.handlers.get(&kind) else {
                    return Err(HostError::Command(format!("no achievements of kind '{kind}'")));
                };
                let updated = handler.add_progress_to_all(amount)?;
                info!(%kind, amount, updated, "Progress applied");
            }
            Command::Claim { id } => {
                let candidates: Vec<_> = self
                    .service
                    .all_achievements()
                    .into_iter()
                    .filter(|achievement| *achievement.id() == id)
                    .collect();
                let Some(achievement) = candidates
                    .iter()
                    .find(|achievement| achievement.is_claimable())
                    .or_else(|| candidates.first())
                else {
                    return Err(HostError::Command(format!("no live achievement '{id}'")));
                };
                achievement.dispense_reward()?;
            }
            Command::Refresh { group } => {
                let Some(timed) = self.timed_groups.get(&group) else {
                    return Err(HostError::Command(format!("no timed group '{group}'")));
                };
                timed.force_refresh()?;
            }
            Command::Status => {
                for line in self.status_lines() {
                    println!("{line}");
                }
            }
            Command::Save => self.save_snapshot()?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// One line per live achievement, then one per reward kind.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .service
            .all_achievements()
            .iter()
            .map(|achievement| {
                let state = if achievement.is_reward_dispensed() {
                    "claimed"
                } else if achievement.is_completed() {
                    "claimable"
                } else {
                    "active"
                };
                format!(
                    "{} [{}] {}/{} {state}",
                    achievement.id(),
                    achievement.kind(),
                    achievement.progress(),
                    achievement.target()
                )
            })
            .collect();
        for timed in self.timed_groups.values() {
            lines.push(format!(
                "group {} refreshes in {}s",
                timed.id(),
                timed.calculate_time_to_refresh().num_seconds()
            ));
        }
        for (kind, dispenser) in &self.dispensers {
            lines.push(format!("granted {kind}: {}", dispenser.granted()));
        }
        lines
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Release the service.
    pub fn dispose(&mut self) {
        self.service.dispose();
        self.timed_groups.clear();
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.service)
            .field("scheduler", &self.scheduler)
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r"
achievements:
  - id: first_blood
    kind: kills
    target_progress: 1
    reward: { kind: coins, amount: 10 }
groups:
  - id: story
    achievements:
      - id: chapter_1
        kind: quests
        target_progress: 2
        reward: { kind: gems, amount: 1 }
timed_groups:
  - id: daily
    active_count: 1
    refresh_interval_secs: 3600
    achievements:
      - id: slay_five
        kind: kills
        target_progress: 5
        reward: { kind: coins, amount: 25 }
";

    fn session(name: &str) -> Session {
        let catalog = AchievementCatalog::parse(CATALOG).unwrap();
        let path = std::env::temp_dir().join(format!(
            "achievements-host-{name}-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let mut session = Session::build(&catalog, path).unwrap();
        session.init().unwrap();
        session
    }

    #[test]
    fn progress_and_claim_flow() {
        let session = session("flow");
        session
            .execute(Command::Progress {
                kind: ConfigKind::new("kills"),
                amount: 1,
            })
            .unwrap();
        session
            .execute(Command::Claim {
                id: achievements_types::AchievementId::new("first_blood"),
            })
            .unwrap();

        let coins = session.dispensers.get(&RewardKind::new("coins")).unwrap();
        assert_eq!(coins.granted(), 10);
        assert!(session
            .status_lines()
            .iter()
            .any(|line| line == "first_blood [kills] 1/1 claimed"));
    }

    #[test]
    fn refresh_populates_timed_group() {
        let session = session("refresh");
        let daily = GroupId::new("daily");
        assert!(session.timed_groups.get(&daily).unwrap().is_empty());

        session.execute(Command::Refresh { group: daily.clone() }).unwrap();
        assert_eq!(session.timed_groups.get(&daily).unwrap().len(), 1);
        assert!(session
            .execute(Command::Refresh {
                group: GroupId::new("weekly"),
            })
            .is_err());
    }

    #[test]
    fn snapshot_file_roundtrip() {
        let first = session("roundtrip");
        first
            .execute(Command::Progress {
                kind: ConfigKind::new("quests"),
                amount: 1,
            })
            .unwrap();
        first.save_snapshot().unwrap();

        let catalog = AchievementCatalog::parse(CATALOG).unwrap();
        let mut second = Session::build(&catalog, first.snapshot_path().to_path_buf()).unwrap();
        assert!(second.load_snapshot().unwrap());
        second.init().unwrap();
        let achievement_lines = |session: &Session| -> Vec<String> {
            session
                .status_lines()
                .into_iter()
                .filter(|line| !line.starts_with("group "))
                .collect()
        };
        assert_eq!(achievement_lines(&second), achievement_lines(&first));
        assert!(achievement_lines(&second)
            .iter()
            .any(|line| line == "chapter_1 [quests] 1/2 active"));

        std::fs::remove_file(first.snapshot_path()).unwrap();
    }

    #[test]
    fn quit_stops_the_loop() {
        let session = session("quit");
        assert_eq!(session.execute(Command::Quit).unwrap(), Flow::Quit);
    }
}
