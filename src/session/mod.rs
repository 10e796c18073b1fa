//! An explicit, owned build session.
//!
//! A [`Session`] ties one watched root to its orchestrator, unit source and
//! change watcher. Everything that mutates it runs on the thread that calls
//! [`SessionDriver::tick`]; other threads talk to it through a
//! [`SessionHandle`].

mod driver;
mod error;

pub use driver::{SessionDriver, SessionHandle};
pub use error::SessionError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BuildReport, CompileBackend, ReportSink};
use crate::config::Settings;
use crate::dirty::Marked;
use crate::orchestrator::{
    BuildOrchestrator, BuildPhase, CommitSummary, Completion, OrchestratorOptions, TriggerOutcome,
};
use crate::queue::EventSender;
use crate::unit::{OwnershipPolicy, RebuildStats, UnitSource};
use crate::watcher::{ChangeSink, ChangeWatcher};

/// Session parameters, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Absolute directory whose files are tracked.
    pub root: PathBuf,
    pub ownership: OwnershipPolicy,
    pub orchestrator: OrchestratorOptions,
    pub tick_interval: Duration,
    /// Build automatically once no change arrived for this long.
    pub auto_build: Option<Duration>,
}

impl SessionConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ownership: OwnershipPolicy::default(),
            orchestrator: OrchestratorOptions::default(),
            tick_interval: Duration::from_millis(100),
            auto_build: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let build = &settings.build;
        Self {
            root: settings.watch_root(),
            ownership: settings.units.ownership,
            orchestrator: OrchestratorOptions::from_config(build),
            tick_interval: Duration::from_millis(build.tick_interval_ms.max(1)),
            auto_build: build
                .auto_build
                .then(|| Duration::from_millis(build.quiet_period_ms)),
        }
    }
}

/// Point-in-time view of a session for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: BuildPhase,
    pub epoch: u64,
    pub units: usize,
    pub files: usize,
    pub dirty: usize,
    pub watching: bool,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            BuildPhase::Idle => write!(f, "idle")?,
            BuildPhase::Building { cycle, outstanding } => {
                write!(f, "building cycle {cycle} ({outstanding} outstanding)")?
            }
        }
        write!(
            f,
            ", {} dirty, {} units / {} files, epoch {}, watcher {}",
            self.dirty,
            self.units,
            self.files,
            self.epoch,
            if self.watching { "on" } else { "off" }
        )
    }
}

/// State owned by one build session.
pub struct Session {
    root: PathBuf,
    orchestrator: BuildOrchestrator,
    watcher: Option<Box<dyn ChangeWatcher>>,
    source: Box<dyn UnitSource>,
    events: EventSender<Session>,
    auto_build: Option<Duration>,
    /// Time of the most recent change not yet covered by a trigger.
    last_change: Option<Instant>,
    last_commit: Option<CommitSummary>,
    shutdown: bool,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        source: Box<dyn UnitSource>,
        backend: Arc<dyn CompileBackend>,
        events: EventSender<Session>,
    ) -> Self {
        let reports = events.clone();
        let sink: ReportSink = Arc::new(move |report: BuildReport| {
            reports.enqueue(move |session: &mut Session| {
                session.on_build_finished(report);
            });
        });

        let orchestrator = BuildOrchestrator::new(&config.root, backend, sink)
            .with_ownership(config.ownership)
            .with_options(config.orchestrator);

        Self {
            root: config.root,
            orchestrator,
            watcher: None,
            source,
            events,
            auto_build: config.auto_build,
            last_change: None,
            last_commit: None,
            shutdown: false,
        }
    }

    pub(crate) fn set_watcher(&mut self, watcher: Box<dyn ChangeWatcher>) {
        self.watcher = Some(watcher);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn orchestrator(&self) -> &BuildOrchestrator {
        &self.orchestrator
    }

    pub(crate) fn orchestrator_mut(&mut self) -> &mut BuildOrchestrator {
        &mut self.orchestrator
    }

    pub fn is_idle(&self) -> bool {
        self.orchestrator.is_idle()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| w.is_active())
    }

    /// Summary of the most recently committed cycle.
    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.last_commit.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        let registry = self.orchestrator.registry();
        SessionStatus {
            phase: self.orchestrator.phase(),
            epoch: self.orchestrator.epoch(),
            units: registry.len(),
            files: registry.file_count(),
            dirty: self.orchestrator.tracker().len(),
            watching: self.is_watching(),
        }
    }

    /// Watcher callback target: posts the path back onto the session queue.
    fn change_sink(&self) -> ChangeSink {
        let events = self.events.clone();
        Arc::new(move |path: PathBuf| {
            events.enqueue(move |session: &mut Session| {
                session.mark_dirty(&path);
            });
        })
    }

    /// Reload units, rebuild the registry and (re)start the watcher.
    ///
    /// Any in-flight cycle is discarded. On failure the registry is empty
    /// and the watcher stays down until the next successful reset.
    pub fn reset_state(&mut self) -> Result<RebuildStats, SessionError> {
        let started = Instant::now();

        if let Some(watcher) = self.watcher.as_mut() {
            watcher.tear_down();
        }
        self.last_change = None;

        let units = match self.source.load_units() {
            Ok(units) => units,
            Err(e) => {
                self.orchestrator.tear_down();
                return Err(e.into());
            }
        };
        let stats = self.orchestrator.reset(units)?;

        let sink = self.change_sink();
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.init(&self.root, sink)?;
        }

        crate::log_event!(
            "session",
            "reset",
            "{} units, {} files from {} in {}ms",
            stats.units,
            stats.files,
            self.source.describe(),
            started.elapsed().as_millis()
        );
        Ok(stats)
    }

    pub fn mark_dirty(&mut self, path: impl AsRef<Path>) -> Marked {
        let marked = self.orchestrator.mark_dirty(path);
        if marked != Marked::OutsideRoot {
            self.last_change = Some(Instant::now());
        }
        marked
    }

    pub fn compile_dirty_now(&mut self) -> TriggerOutcome {
        let outcome = self.orchestrator.compile_dirty();
        if !matches!(outcome, TriggerOutcome::Busy { .. }) {
            self.last_change = None;
        }
        outcome
    }

    pub fn on_build_finished(&mut self, report: BuildReport) -> Completion {
        let completion = self.orchestrator.on_build_finished(report);
        if let Completion::Committed(summary) = &completion {
            self.last_commit = Some(summary.clone());
        }
        completion
    }

    pub(crate) fn check_timeout(&mut self, now: Instant) {
        if let Some(summary) = self.orchestrator.check_timeout(now) {
            self.last_commit = Some(summary);
        }
    }

    /// Trigger a build when auto-build is on and changes have settled.
    pub(crate) fn maybe_auto_build(&mut self, now: Instant) -> Option<TriggerOutcome> {
        let quiet = self.auto_build?;
        let last = self.last_change?;
        if now.duration_since(last) < quiet || !self.orchestrator.is_idle() {
            return None;
        }
        crate::debug_event!("session", "auto-build", "quiet for {}ms", quiet.as_millis());
        Some(self.compile_dirty_now())
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// Stop watching and drop all engine state.
    pub fn tear_down(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.tear_down();
        }
        self.orchestrator.tear_down();
        self.last_change = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("status", &self.status())
            .field("backend", &self.orchestrator.backend_name())
            .finish()
    }
}
