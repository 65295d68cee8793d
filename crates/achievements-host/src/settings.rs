//! Host settings.
//!
//! Settings come from `ACHIEVEMENTS_*` environment variables. A positional
//! command-line argument overrides the catalog path.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::HostError;

/// Default catalog file, relative to the working directory.
const DEFAULT_CATALOG: &str = "achievements.yaml";

/// Default snapshot file, relative to the working directory.
const DEFAULT_SNAPSHOT: &str = "achievements-save.json";

/// Default tick period in milliseconds.
const DEFAULT_TICK_MS: u64 = 1000;

/// Runtime settings for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    /// YAML achievement catalog to load.
    pub catalog_path: PathBuf,
    /// JSON snapshot restored at startup and written on `save` and exit.
    pub snapshot_path: PathBuf,
    /// Period of the tick driver.
    pub tick_interval: Duration,
}

impl HostSettings {
    /// Load settings from the process environment and arguments.
    ///
    /// Variables:
    /// - `ACHIEVEMENTS_CATALOG` -- catalog path (default `achievements.yaml`)
    /// - `ACHIEVEMENTS_SNAPSHOT` -- snapshot path (default `achievements-save.json`)
    /// - `ACHIEVEMENTS_TICK_MS` -- tick period in milliseconds (default 1000)
    pub fn from_env() -> Result<Self, HostError> {
        Self::resolve(
            std::env::args().nth(1),
            |name| std::env::var(name).ok(),
        )
    }

    /// Resolve settings from an optional catalog argument and a variable
    /// lookup.
    pub fn resolve(
        catalog_arg: Option<String>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, HostError> {
        let catalog_path = catalog_arg
            .or_else(|| var("ACHIEVEMENTS_CATALOG"))
            .unwrap_or_else(|| DEFAULT_CATALOG.to_owned());
        let snapshot_path =
            var("ACHIEVEMENTS_SNAPSHOT").unwrap_or_else(|| DEFAULT_SNAPSHOT.to_owned());

        let tick_ms: u64 = match var("ACHIEVEMENTS_TICK_MS") {
            Some(raw) => raw
                .parse()
                .map_err(|e| HostError::Settings(format!("invalid ACHIEVEMENTS_TICK_MS: {e}")))?,
            None => DEFAULT_TICK_MS,
        };
        if tick_ms == 0 {
            return Err(HostError::Settings(
                "ACHIEVEMENTS_TICK_MS must be positive".to_owned(),
            ));
        }

        Ok(Self {
            catalog_path: PathBuf::from(catalog_path),
            snapshot_path: PathBuf::from(snapshot_path),
            tick_interval: Duration::from_millis(tick_ms),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides() {
        let settings = HostSettings::resolve(None, |_| None).unwrap();
        assert_eq!(settings.catalog_path, PathBuf::from(DEFAULT_CATALOG));
        assert_eq!(settings.snapshot_path, PathBuf::from(DEFAULT_SNAPSHOT));
        assert_eq!(settings.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn argument_wins_over_environment() {
        let settings = HostSettings::resolve(Some("cli.yaml".to_owned()), |name| {
            (name == "ACHIEVEMENTS_CATALOG").then(|| "env.yaml".to_owned())
        })
        .unwrap();
        assert_eq!(settings.catalog_path, PathBuf::from("cli.yaml"));
    }

    #[test]
    fn tick_period_is_validated() {
        let zero = HostSettings::resolve(None, |name| {
            (name == "ACHIEVEMENTS_TICK_MS").then(|| "0".to_owned())
        });
        assert!(matches!(zero, Err(HostError::Settings(_))));

        let garbage = HostSettings::resolve(None, |name| {
            (name == "ACHIEVEMENTS_TICK_MS").then(|| "soon".to_owned())
        });
        assert!(matches!(garbage, Err(HostError::Settings(_))));
    }
}
