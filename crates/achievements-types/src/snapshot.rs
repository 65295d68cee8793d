//! Persistence snapshots.
//!
//! Snapshots are plain serializable records. The core fills and reads them
//! but never performs I/O; the host decides where they are stored. Field
//! names serialize in camelCase so that saves stay compatible with existing
//! JSON save files.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{AchievementId, GroupId};

/// Persisted state of a single achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AchievementSnapshot {
    /// Identifier of the achievement configuration.
    pub id: AchievementId,
    /// Accumulated progress.
    pub progress: u32,
    /// Whether the reward has already been claimed.
    pub is_reward_dispensed: bool,
}

/// Persisted state of a group.
///
/// Timed groups additionally store the time of their last refresh as an
/// RFC 3339 timestamp; static groups leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct GroupSnapshot {
    /// Identifier of the group.
    pub id: GroupId,
    /// One entry per live achievement in the group.
    #[serde(default)]
    pub achievements: Vec<AchievementSnapshot>,
    /// Last refresh of a timed group, RFC 3339 with sub-second precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<String>,
}

impl GroupSnapshot {
    /// Create an empty snapshot for the given group.
    pub const fn new(id: GroupId) -> Self {
        Self {
            id,
            achievements: Vec::new(),
            last_refresh_time: None,
        }
    }

    /// Whether the snapshot carries the timed-group extension.
    pub const fn is_timed(&self) -> bool {
        self.last_refresh_time.is_some()
    }
}

/// Persisted state of the whole achievements service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ServiceSnapshot {
    /// Achievements registered directly with the service.
    #[serde(default)]
    pub non_grouped_achievements: Vec<AchievementSnapshot>,
    /// One entry per group, timed groups using the extended form.
    #[serde(default)]
    pub groups: Vec<GroupSnapshot>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_camel_case() {
        let snapshot = ServiceSnapshot {
            non_grouped_achievements: vec![AchievementSnapshot {
                id: AchievementId::new("a"),
                progress: 3,
                is_reward_dispensed: true,
            }],
            groups: vec![GroupSnapshot {
                id: GroupId::new("daily"),
                achievements: Vec::new(),
                last_refresh_time: Some("2026-01-01T00:00:00Z".to_owned()),
            }],
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["nonGroupedAchievements"][0]["isRewardDispensed"], true);
        assert_eq!(value["groups"][0]["lastRefreshTime"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn static_group_snapshot_omits_timestamp() {
        let snapshot = GroupSnapshot::new(GroupId::new("story"));
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("lastRefreshTime"));
        assert!(!snapshot.is_timed());

        let restored: GroupSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
