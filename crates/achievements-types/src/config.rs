//! Immutable configuration records.
//!
//! Configurations are authored outside the core (a YAML catalog, a content
//! pipeline, a remote config service) and are only ever read by it. Many
//! achievement instances may share one configuration over the lifetime of a
//! timed group, so the core wraps them in reference-counted handles once and
//! never copies them per instance.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{AchievementId, ConfigKind, GroupId, RewardKind};

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// Descriptor of the reward granted when an achievement is claimed.
///
/// The core only looks at [`kind`](Self::kind) to pick a dispenser; the
/// remaining fields belong to whichever dispenser handles that kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RewardConfig {
    /// Shape discriminant used to resolve the reward dispenser.
    pub kind: RewardKind,
    /// Quantity granted (coins, items, experience points).
    #[serde(default = "default_reward_amount")]
    pub amount: u32,
    /// Optional icon reference for the host UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Free-form payload interpreted by the dispenser.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RewardConfig {
    /// Create a reward descriptor with the given kind and amount and no
    /// extra payload.
    pub fn new(kind: impl Into<RewardKind>, amount: u32) -> Self {
        Self {
            kind: kind.into(),
            amount,
            icon: None,
            data: serde_json::Value::Null,
        }
    }
}

const fn default_reward_amount() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

/// Description of one achievement: what it is, how much progress it needs,
/// and what it pays out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AchievementConfig {
    /// Identifier, unique within the declaring scope (a group or the
    /// service's ungrouped set).
    pub id: AchievementId,
    /// Shape discriminant used to match progress handlers.
    pub kind: ConfigKind,
    /// Progress required to complete the achievement. Must be positive.
    pub target_progress: u32,
    /// Reward descriptor handed to the dispenser on claim.
    pub reward: RewardConfig,
}

impl AchievementConfig {
    /// Create an achievement configuration.
    pub fn new(
        id: impl Into<AchievementId>,
        kind: impl Into<ConfigKind>,
        target_progress: u32,
        reward: RewardConfig,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            target_progress,
            reward,
        }
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A static group: every declared achievement is live at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimpleGroupConfig {
    /// Group identifier.
    pub id: GroupId,
    /// Every achievement in the group.
    #[serde(default)]
    pub achievements: Vec<AchievementConfig>,
}

/// A rotating group: a random subset of the pool is live at once and the
/// subset is redrawn on a wall-clock interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimedGroupConfig {
    /// Group identifier.
    pub id: GroupId,
    /// The pool that active achievements are sampled from.
    #[serde(default)]
    pub achievements: Vec<AchievementConfig>,
    /// Number of achievements drawn per refresh. Must be at least 1.
    #[serde(default = "default_active_count")]
    pub active_count: u32,
    /// Seconds between refreshes. Must be at least 1.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Keep completed-but-unclaimed achievements across a refresh.
    #[serde(default = "default_retain_unclaimed")]
    pub retain_unclaimed: bool,
}

const fn default_active_count() -> u32 {
    1
}

const fn default_refresh_interval_secs() -> u64 {
    86_400
}

const fn default_retain_unclaimed() -> bool {
    true
}
