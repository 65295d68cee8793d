//! Achievement catalog loading.
//!
//! The catalog is the content a host ships: ungrouped achievements, static
//! groups, and timed groups, declared in one YAML file:
//!
//! ```yaml
//! achievements:
//!   - id: first_blood
//!     kind: kills
//!     target_progress: 1
//!     reward: { kind: coins, amount: 10 }
//! groups:
//!   - id: story
//!     achievements: [...]
//! timed_groups:
//!   - id: daily
//!     active_count: 3
//!     refresh_interval_secs: 86400
//!     achievements: [...]
//! ```
//!
//! Parsing only checks the shape. [`AchievementCatalog::validate`] checks
//! the rules a service would otherwise reject one entry at a time.

use std::collections::BTreeSet;
use std::path::Path;

use achievements_types::{AchievementConfig, SimpleGroupConfig, TimedGroupConfig};
use serde::{Deserialize, Serialize};

/// Errors that can occur when loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the catalog file from disk.
    #[error("failed to read catalog file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse catalog YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The catalog parsed but breaks a content rule.
    #[error("invalid catalog: {reason}")]
    Invalid {
        /// The broken rule.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Every achievement a host declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementCatalog {
    /// Achievements outside any group.
    #[serde(default)]
    pub achievements: Vec<AchievementConfig>,

    /// Groups whose declared achievements are all live.
    #[serde(default)]
    pub groups: Vec<SimpleGroupConfig>,

    /// Groups that rotate a sampled subset of their pool.
    #[serde(default)]
    pub timed_groups: Vec<TimedGroupConfig>,
}

impl AchievementCatalog {
    /// Load and validate a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, and
    /// [`ConfigError::Invalid`] if it breaks a content rule.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a catalog from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] if it breaks a content rule.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_yml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the content rules:
    ///
    /// - every target progress is positive;
    /// - achievement ids are unique among the ungrouped achievements and
    ///   within each group;
    /// - group ids are unique across static and timed groups;
    /// - timed groups have a positive `active_count` and refresh interval.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first broken rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_achievements("ungrouped achievements", &self.achievements)?;

        let mut group_ids = BTreeSet::new();
        for group in &self.groups {
            if !group_ids.insert(&group.id) {
                return Err(invalid(format!("duplicate group id {}", group.id)));
            }
            check_achievements(&format!("group {}", group.id), &group.achievements)?;
        }
        for group in &self.timed_groups {
            if !group_ids.insert(&group.id) {
                return Err(invalid(format!("duplicate group id {}", group.id)));
            }
            if group.active_count == 0 {
                return Err(invalid(format!(
                    "timed group {} must have a positive active_count",
                    group.id
                )));
            }
            if group.refresh_interval_secs == 0 {
                return Err(invalid(format!(
                    "timed group {} must have a positive refresh interval",
                    group.id
                )));
            }
            check_achievements(&format!("timed group {}", group.id), &group.achievements)?;
        }
        Ok(())
    }

    /// Total number of declared achievement configurations.
    pub fn len(&self) -> usize {
        let grouped: usize = self.groups.iter().map(|group| group.achievements.len()).sum();
        let timed: usize = self
            .timed_groups
            .iter()
            .map(|group| group.achievements.len())
            .sum();
        self.achievements
            .len()
            .saturating_add(grouped)
            .saturating_add(timed)
    }

    /// Whether the catalog declares nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_achievements(scope: &str, achievements: &[AchievementConfig]) -> Result<(), ConfigError> {
    let mut ids = BTreeSet::new();
    for achievement in achievements {
        if !ids.insert(&achievement.id) {
            return Err(invalid(format!(
                "duplicate achievement id {} in {scope}",
                achievement.id
            )));
        }
        if achievement.target_progress == 0 {
            return Err(invalid(format!(
                "achievement {} in {scope} must have a positive target_progress",
                achievement.id
            )));
        }
    }
    Ok(())
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}
