//! Achievement tracking core.
//!
//! This crate tracks player achievements: goals with a progress counter and
//! a reward. It is single-threaded and synchronous. Shared state lives
//! behind `Rc` with `Cell`/`RefCell` interior mutability, and every
//! notification is delivered before the operation that caused it returns.
//!
//! # Modules
//!
//! - [`achievement`] -- The progress state machine and its events.
//! - [`reward`] -- [`RewardDispenser`] capability for delivering rewards.
//! - [`handler`] -- [`AchievementHandler`] capability for applying progress,
//!   and the in-memory [`ProgressHandler`].
//! - [`factory`] -- [`AchievementFactory`], which resolves capabilities by
//!   kind and builds achievements.
//! - [`notify`] -- Synchronous typed publish/subscribe.
//! - [`group`] -- [`Group`] trait and the keyed [`AchievementGroup`].
//! - [`timed`] -- [`TimedGroup`], a group that rotates a sampled active set.
//! - [`tick`] -- Tick registration and the in-process [`TickScheduler`].
//! - [`clock`] -- Injectable wall clock.
//! - [`binding`] -- Keeps handlers in sync with live achievements.
//! - [`service`] -- [`AchievementsService`], the host-facing entry point.
//! - [`config`] -- YAML achievement catalog.
//!
//! [`RewardDispenser`]: reward::RewardDispenser
//! [`AchievementHandler`]: handler::AchievementHandler
//! [`ProgressHandler`]: handler::ProgressHandler
//! [`AchievementFactory`]: factory::AchievementFactory
//! [`Group`]: group::Group
//! [`AchievementGroup`]: group::AchievementGroup
//! [`TimedGroup`]: timed::TimedGroup
//! [`TickScheduler`]: tick::TickScheduler
//! [`AchievementsService`]: service::AchievementsService

pub mod achievement;
pub mod binding;
pub mod clock;
pub mod config;
pub mod factory;
pub mod group;
pub mod handler;
pub mod notify;
pub mod reward;
pub mod service;
pub mod tick;
pub mod timed;

pub use achievement::{Achievement, AchievementError, AchievementEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AchievementCatalog, ConfigError};
pub use factory::{AchievementFactory, FactoryError};
pub use group::{Group, GroupError, GroupEvent, GroupUpdate, MembershipSink, SimpleGroup};
pub use handler::{AchievementHandler, HandlerError, ProgressHandler};
pub use reward::{RewardDispenser, RewardError};
pub use service::{AchievementsService, ServiceError};
pub use tick::{TickRegistrar, TickScheduler, TickableGroup};
pub use timed::TimedGroup;
