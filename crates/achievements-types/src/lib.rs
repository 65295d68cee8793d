//! Shared type definitions for the achievements system.
//!
//! This crate holds the plain data that crosses the boundary between the
//! core and its host: identifiers, authored configuration records, and
//! persistence snapshots. Types are exported to `TypeScript` via `ts-rs` so
//! a host UI can render configurations and saves without re-declaring them.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for achievement/group identifiers and the
//!   kind discriminants used for capability matching
//! - [`config`] -- Immutable achievement, reward, and group configurations
//! - [`snapshot`] -- Persistence snapshots for achievements, groups, and the
//!   service

pub mod config;
pub mod ids;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use config::{AchievementConfig, RewardConfig, SimpleGroupConfig, TimedGroupConfig};
pub use ids::{AchievementId, ConfigKind, GroupId, RewardKind};
pub use snapshot::{AchievementSnapshot, GroupSnapshot, ServiceSnapshot};
