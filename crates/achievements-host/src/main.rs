//! Reference host for the achievements service.
//!
//! Loads an achievement catalog, restores the last snapshot, then drives
//! the service from two sources on one thread: a periodic tick for timed
//! groups and console commands read from stdin.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Resolve settings from arguments and `ACHIEVEMENTS_*` variables
//! 3. Load and validate the YAML catalog
//! 4. Build the session (dispensers, handlers, groups, scheduler)
//! 5. Restore the snapshot file, if present
//! 6. Initialize the service
//! 7. Run the tick/command loop until `quit` or end of input
//! 8. Save the snapshot and dispose the service

mod command;
mod dispenser;
mod error;
mod session;
mod settings;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use achievements_core::AchievementCatalog;

use crate::command::Command;
use crate::session::{Flow, Session};
use crate::settings::HostSettings;

/// Application entry point for the host.
///
/// # Errors
///
/// Returns an error if startup fails or the final snapshot cannot be saved.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("achievements-host starting");

    // 2. Resolve settings.
    let settings = HostSettings::from_env()?;
    info!(
        catalog = %settings.catalog_path.display(),
        snapshot = %settings.snapshot_path.display(),
        tick_ms = settings.tick_interval.as_millis(),
        "Settings resolved"
    );

    // 3. Load the catalog.
    let catalog = AchievementCatalog::from_file(&settings.catalog_path)
        .with_context(|| format!("loading {}", settings.catalog_path.display()))?;
    info!(
        achievements = catalog.len(),
        groups = catalog.groups.len(),
        timed_groups = catalog.timed_groups.len(),
        "Catalog loaded"
    );

    // 4-6. Build, restore, initialize.
    let mut session = Session::build(&catalog, settings.snapshot_path.clone())?;
    session
        .load_snapshot()
        .context("restoring snapshot")?;
    session.init()?;

    // 7. Run until quit or end of input.
    run(&session, &settings).await;

    // 8. Save and release.
    session.save_snapshot().context("saving snapshot")?;
    session.dispose();
    info!("achievements-host shutdown complete");
    Ok(())
}

/// Interleave ticks and console commands until `quit` or end of input.
///
/// Command and tick failures are logged and the loop keeps going.
async fn run(session: &Session, settings: &HostSettings) {
    let mut ticker = time::interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = session.tick(settings.tick_interval) {
                    warn!(error = %e, "Tick failed");
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("End of input");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>().and_then(|command| session.execute(command)) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => return,
                    Err(e) => warn!(error = %e, "Command failed"),
                }
            }
        }
    }
}
