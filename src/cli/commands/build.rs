//! Build command - one-shot rebuild of the units owning the given files.

use std::path::PathBuf;

use anyhow::{Context, bail};

use crate::config::Settings;
use crate::notifications::BuildEventBroadcaster;
use crate::paths;
use crate::session::{Session, SessionConfig, SessionDriver};

/// Arguments for the build command.
pub struct BuildArgs {
    pub files: Vec<PathBuf>,
    pub dry_run: bool,
}

/// Run the build command.
///
/// Fails when any unit failed to build, so scripts can check the exit code.
pub async fn run(args: BuildArgs, settings: &Settings) -> anyhow::Result<()> {
    let BuildArgs { files, dry_run } = args;

    let backend = super::backend(settings, dry_run)?;
    let broadcaster = BuildEventBroadcaster::default();
    let printer = super::spawn_event_printer(broadcaster.subscribe());

    let mut driver = SessionDriver::new(
        SessionConfig::from_settings(settings),
        Box::new(super::unit_source(settings)),
        backend,
    )
    .with_broadcaster(broadcaster);

    driver.start().context("Failed to load build units")?;

    let handle = driver.handle();
    if files.is_empty() {
        // Full rebuild: every registered source is dirty
        handle.enqueue(|session: &mut Session| {
            let sources: Vec<PathBuf> = session
                .orchestrator()
                .registry()
                .units()
                .flat_map(|unit| unit.sources().to_vec())
                .collect();
            for source in sources {
                session.mark_dirty(source);
            }
        });
    } else {
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        for file in files {
            handle.mark_dirty(paths::normalize(&cwd, &file));
        }
    }
    handle.compile_dirty_now();

    driver.run_until_idle().await;

    let failed = driver
        .session()
        .last_commit()
        .map(|summary| summary.failed.clone())
        .unwrap_or_default();

    driver.session_mut().tear_down();
    // Let the printer flush the last events
    drop(driver);
    let _ = printer.await;

    if !failed.is_empty() {
        bail!("{} unit(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
