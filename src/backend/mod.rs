//! Compile backends.
//!
//! The orchestrator hands each affected unit to a [`CompileBackend`] together
//! with a one-shot [`BuildCompletion`]. The backend must return immediately
//! and report later, from any thread, by consuming the completion.
//!
//! Backends provided here:
//! - [`CommandBackend`] runs an external compiler per unit
//! - [`DeferredBackend`] queues requests for the host to complete
//! - [`DryRunBackend`] succeeds immediately without compiling

mod command;
pub mod diagnostics;
mod deferred;
mod error;

pub use command::CommandBackend;
pub use deferred::{BuildRequest, DeferredBackend, DryRunBackend};
pub use diagnostics::{Diagnostic, Severity};
pub use error::BackendError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::unit::BuildUnit;

/// Identifies the build cycle a completion belongs to.
///
/// `epoch` changes on every reset, `cycle` on every trigger. A report whose
/// ticket does not match the in-flight cycle is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildTicket {
    pub epoch: u64,
    pub cycle: u64,
}

impl fmt::Display for BuildTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.cycle)
    }
}

/// Result of one unit build, as delivered back to the orchestrator.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub ticket: BuildTicket,
    pub unit: String,
    pub output: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed: Duration,
}

impl BuildReport {
    /// A build succeeded when no diagnostic has error severity.
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Where finished reports are delivered. Must be callable from any thread.
pub type ReportSink = Arc<dyn Fn(BuildReport) + Send + Sync>;

/// One-shot completion handle for a single `build()` call.
///
/// Consuming it with [`complete`](Self::complete) delivers the report
/// exactly once. Dropping it without completing delivers a failed report,
/// so a buggy backend cannot leave a cycle waiting forever.
pub struct BuildCompletion {
    ticket: BuildTicket,
    unit: String,
    output: PathBuf,
    started: Instant,
    sink: Option<ReportSink>,
}

impl BuildCompletion {
    pub fn new(ticket: BuildTicket, unit: &BuildUnit, sink: ReportSink) -> Self {
        Self {
            ticket,
            unit: unit.name().to_string(),
            output: unit.output().to_path_buf(),
            started: Instant::now(),
            sink: Some(sink),
        }
    }

    pub fn ticket(&self) -> BuildTicket {
        self.ticket
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Deliver the unit's diagnostics. An empty list means success.
    pub fn complete(mut self, diagnostics: Vec<Diagnostic>) {
        self.deliver(diagnostics);
    }

    /// Deliver a failure carrying a single error message.
    pub fn fail(self, message: impl Into<String>) {
        self.complete(vec![Diagnostic::error(message)]);
    }

    fn deliver(&mut self, diagnostics: Vec<Diagnostic>) {
        if let Some(sink) = self.sink.take() {
            sink(BuildReport {
                ticket: self.ticket,
                unit: std::mem::take(&mut self.unit),
                output: std::mem::take(&mut self.output),
                diagnostics,
                elapsed: self.started.elapsed(),
            });
        }
    }
}

impl fmt::Debug for BuildCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCompletion")
            .field("ticket", &self.ticket)
            .field("unit", &self.unit)
            .field("delivered", &self.sink.is_none())
            .finish()
    }
}

impl Drop for BuildCompletion {
    fn drop(&mut self) {
        if self.sink.is_some() {
            tracing::warn!(
                "[backend] completion for '{}' dropped without a report",
                self.unit
            );
            self.deliver(vec![Diagnostic::error(
                "build backend dropped the completion without reporting",
            )]);
        }
    }
}

/// Compiles one build unit asynchronously.
///
/// `build` is fire-and-forget: it must not block the caller. The completion
/// may be consumed on any thread, at any later time, in any order relative
/// to other units.
pub trait CompileBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start building `unit` and eventually consume `completion`.
    fn build(&self, unit: Arc<BuildUnit>, completion: BuildCompletion);

    /// Stop work still running for `ticket`. Called when the cycle times out
    /// or is discarded by a reset; anything reported afterwards is stale.
    fn cancel(&self, _ticket: BuildTicket) {}
}
