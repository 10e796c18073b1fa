//! Watch command - long-running session driven by file changes and stdin.

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::Context;

use crate::config::Settings;
use crate::notifications::BuildEventBroadcaster;
use crate::session::{Session, SessionConfig, SessionDriver, SessionHandle};
use crate::watcher::NotifyWatcher;

/// Arguments for the watch command.
pub struct WatchArgs {
    pub auto: bool,
    pub dry_run: bool,
}

/// An interactive command read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinCommand {
    Build,
    Reset,
    Status,
    Quit,
}

impl StdinCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "b" | "build" => Some(Self::Build),
            "r" | "reset" => Some(Self::Reset),
            "s" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }

    /// Enqueue the command. `false` once the session is gone.
    fn apply(self, handle: &SessionHandle) -> bool {
        match self {
            Self::Build => handle.compile_dirty_now(),
            Self::Reset => handle.reset_state(),
            Self::Status => {
                handle.enqueue(|session: &mut Session| println!("{}", session.status()))
            }
            Self::Quit => handle.shutdown(),
        }
    }
}

/// Apply stdin commands until `q`, end of input, or the session goes away.
///
/// Returns the number of commands applied.
fn read_commands(input: impl BufRead, handle: &SessionHandle) -> usize {
    let mut applied = 0;
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = StdinCommand::parse(&line) else {
            eprintln!("Unknown command '{}'. Use b, r, s or q.", line.trim());
            continue;
        };
        if !command.apply(handle) {
            break;
        }
        applied += 1;
        if command == StdinCommand::Quit {
            break;
        }
    }
    applied
}

/// Run the watch command until `q` or Ctrl+C.
pub async fn run(args: WatchArgs, settings: &Settings) -> anyhow::Result<()> {
    let WatchArgs { auto, dry_run } = args;

    let mut config = SessionConfig::from_settings(settings);
    if auto {
        config.auto_build = Some(Duration::from_millis(settings.build.quiet_period_ms));
    }
    let auto_build = config.auto_build;
    let root = config.root.clone();

    let backend = super::backend(settings, dry_run)?;
    let broadcaster = BuildEventBroadcaster::default();
    let printer = super::spawn_event_printer(broadcaster.subscribe());

    let mut driver = SessionDriver::new(
        config,
        Box::new(super::unit_source(settings)),
        backend,
    )
    .with_watcher(Box::new(NotifyWatcher::new(&settings.watch.extension)))
    .with_broadcaster(broadcaster);

    let stats = driver.start().context("Failed to start watch session")?;

    println!(
        "Watching {} (*.{}): {} units, {} files",
        root.display(),
        settings.watch.extension,
        stats.units,
        stats.files
    );
    match auto_build {
        Some(quiet) => println!(
            "Auto-build after {}ms without changes. Type 'q' to quit.",
            quiet.as_millis()
        ),
        None => println!("Type 'b' to build, 'r' to reset, 's' for status, 'q' to quit."),
    }

    // Blocking stdin reads cannot be cancelled; keep them off the runtime
    let handle = driver.handle();
    thread::Builder::new()
        .name("dirtyc-stdin".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), &handle))
        .context("Failed to start stdin reader")?;

    driver
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[cli] cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    drop(driver);
    let _ = printer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DryRunBackend;
    use crate::unit::StaticUnitSource;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn test_parse_stdin_commands() {
        assert_eq!(StdinCommand::parse("b"), Some(StdinCommand::Build));
        assert_eq!(StdinCommand::parse(" BUILD \n"), Some(StdinCommand::Build));
        assert_eq!(StdinCommand::parse("r"), Some(StdinCommand::Reset));
        assert_eq!(StdinCommand::parse("status"), Some(StdinCommand::Status));
        assert_eq!(StdinCommand::parse("q"), Some(StdinCommand::Quit));
        assert_eq!(StdinCommand::parse("rebuild"), None);
    }

    fn driver() -> SessionDriver {
        SessionDriver::new(
            SessionConfig::new("/p"),
            Box::new(StaticUnitSource::default()),
            Arc::new(DryRunBackend),
        )
    }

    #[test]
    fn test_read_commands_stops_at_quit() {
        let driver = driver();
        let input = Cursor::new("b\n\nnope\ns\nq\nb\n");

        let applied = read_commands(input, &driver.handle());

        assert_eq!(applied, 3);
        assert_eq!(driver.pending(), 3);
    }

    #[test]
    fn test_read_commands_stops_when_session_is_gone() {
        let handle = driver().handle();
        let input = Cursor::new("b\nr\n");

        assert_eq!(read_commands(input, &handle), 0);
    }
}
