//! Backend that runs an external compiler command per unit.
//!
//! The command line comes from `build.command` in the settings. Arguments may
//! contain placeholders:
//!
//! | Placeholder    | Expands to                                  |
//! |----------------|---------------------------------------------|
//! | `{name}`       | unit name                                   |
//! | `{output}`     | output artifact path                        |
//! | `{sources}`    | one argument per source file                |
//! | `{references}` | one argument per reference                  |
//! | `{defines}`    | one argument per define                     |
//!
//! A list placeholder embedded in a longer argument (e.g. `-r:{references}`)
//! repeats that argument once per item.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::diagnostics::{self, Diagnostic};
use super::{BackendError, BuildCompletion, BuildTicket, CompileBackend};
use crate::config::CommandConfig;
use crate::unit::BuildUnit;

/// Runs the configured compiler on the tokio runtime, one process per unit.
///
/// Cancelling a ticket aborts its tasks, which kills the compiler processes.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    runtime: Handle,
    running: Mutex<Vec<(BuildTicket, AbortHandle)>>,
}

impl CommandBackend {
    /// Create a backend bound to an explicit runtime handle.
    pub fn new(
        config: &CommandConfig,
        working_dir: impl Into<PathBuf>,
        runtime: Handle,
    ) -> Result<Self, BackendError> {
        if config.program.trim().is_empty() {
            return Err(BackendError::NoCommand);
        }
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: working_dir.into(),
            runtime,
            running: Mutex::new(Vec::new()),
        })
    }

    /// Create a backend on the runtime of the calling context.
    pub fn from_current_runtime(
        config: &CommandConfig,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self, BackendError> {
        let runtime = Handle::try_current().map_err(|e| BackendError::NoRuntime {
            reason: e.to_string(),
        })?;
        Self::new(config, working_dir, runtime)
    }

    /// Expand the argument templates for `unit`.
    pub fn expand_args(&self, unit: &BuildUnit) -> Vec<String> {
        expand_args(&self.args, unit)
    }

    /// Number of compiler tasks that have not finished yet.
    pub fn running(&self) -> usize {
        self.running
            .lock()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }
}

pub(crate) fn expand_args(templates: &[String], unit: &BuildUnit) -> Vec<String> {
    let sources: Vec<String> = unit
        .sources()
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let output = unit.output().display().to_string();

    let mut args = Vec::new();
    for template in templates {
        let template = template
            .replace("{name}", unit.name())
            .replace("{output}", &output);

        let list: Option<(&str, &[String])> = if template.contains("{sources}") {
            Some(("{sources}", sources.as_slice()))
        } else if template.contains("{references}") {
            Some(("{references}", unit.references()))
        } else if template.contains("{defines}") {
            Some(("{defines}", unit.defines()))
        } else {
            None
        };

        match list {
            Some((placeholder, items)) => {
                args.extend(items.iter().map(|item| template.replace(placeholder, item)));
            }
            None => args.push(template),
        }
    }
    args
}

async fn run_compiler(
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
) -> Result<Vec<Diagnostic>, BackendError> {
    let output = Command::new(&program)
        .args(&args)
        .current_dir(&working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| BackendError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut diagnostics = diagnostics::parse_output(&String::from_utf8_lossy(&output.stdout));
    diagnostics.extend(diagnostics::parse_output(&String::from_utf8_lossy(
        &output.stderr,
    )));

    if !output.status.success() && !diagnostics.iter().any(Diagnostic::is_error) {
        diagnostics.push(Diagnostic::error(format!(
            "'{program}' exited with {}",
            output.status
        )));
    }
    Ok(diagnostics)
}

impl CompileBackend for CommandBackend {
    fn name(&self) -> &str {
        "command"
    }

    fn build(&self, unit: Arc<BuildUnit>, completion: BuildCompletion) {
        let program = self.program.clone();
        let args = self.expand_args(&unit);
        let working_dir = self.working_dir.clone();

        let ticket = completion.ticket();

        crate::debug_event!("command", "spawn", "{} {}", program, args.join(" "));

        let task = self.runtime.spawn(async move {
            match run_compiler(program, args, working_dir).await {
                Ok(diagnostics) => completion.complete(diagnostics),
                Err(e) => completion.fail(e.to_string()),
            }
        });

        let mut running = self.running.lock();
        running.retain(|(_, task)| !task.is_finished());
        running.push((ticket, task.abort_handle()));
    }

    fn cancel(&self, ticket: BuildTicket) {
        let mut aborted = 0;
        self.running.lock().retain(|(owner, task)| {
            if *owner != ticket {
                return true;
            }
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
            false
        });
        if aborted > 0 {
            crate::log_event!("command", "cancelled", "{aborted} compiler runs for {ticket}");
        }
    }
}
