//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module. Shared session wiring
//! lives here.

pub mod build;
pub mod init;
pub mod units;
pub mod watch;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::backend::{CommandBackend, CompileBackend, DryRunBackend};
use crate::config::Settings;
use crate::notifications::BuildEvent;
use crate::unit::ManifestUnitSource;

/// Pick the compile backend for a command.
pub(crate) fn backend(settings: &Settings, dry_run: bool) -> anyhow::Result<Arc<dyn CompileBackend>> {
    if dry_run {
        return Ok(Arc::new(DryRunBackend));
    }
    let backend = CommandBackend::from_current_runtime(&settings.build.command, settings.base_dir())
        .context("Cannot run builds; set [build.command] in settings.toml or pass --dry-run")?;
    Ok(Arc::new(backend))
}

pub(crate) fn unit_source(settings: &Settings) -> ManifestUnitSource {
    ManifestUnitSource::new(settings.manifest_path(), settings.base_dir())
}

/// One line per event for terminal output. `None` for events not worth
/// printing.
pub(crate) fn describe_event(event: &BuildEvent) -> Option<String> {
    match event {
        BuildEvent::FileDirty { path } => Some(format!("  dirty    {}", path.display())),
        BuildEvent::NothingToBuild { dirty, unresolved } => Some(format!(
            "Nothing to build ({dirty} dirty, {unresolved} not owned by any unit)"
        )),
        BuildEvent::TriggerRejected { outstanding } => Some(format!(
            "Build already running ({outstanding} units outstanding)"
        )),
        BuildEvent::CycleStarted { cycle, units } => {
            Some(format!("Build #{cycle}: {}", units.join(", ")))
        }
        BuildEvent::UnitFinished {
            unit,
            succeeded,
            errors,
            warnings,
            ..
        } => Some(if *succeeded {
            format!("  ok       {unit} ({warnings} warnings)")
        } else {
            format!("  FAILED   {unit} ({errors} errors, {warnings} warnings)")
        }),
        BuildEvent::CycleTimedOut { units, .. } => {
            Some(format!("  timeout  {}", units.join(", ")))
        }
        BuildEvent::CycleCommitted {
            cycle,
            failed,
            retained,
            elapsed,
            ..
        } => Some(if failed.is_empty() {
            format!("Build #{cycle} succeeded in {:.2}s", elapsed.as_secs_f64())
        } else {
            format!(
                "Build #{cycle} failed in {:.2}s ({} units failed, {retained} files still dirty)",
                elapsed.as_secs_f64(),
                failed.len()
            )
        }),
        BuildEvent::Reset { .. } => None,
    }
}

/// Print build events to stdout until the channel closes.
pub(crate) fn spawn_event_printer(mut rx: broadcast::Receiver<BuildEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    crate::debug_event!("cli", "lagged", "skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
