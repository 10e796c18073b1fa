//! Dirty-set resolution and build fan-out/fan-in.
//!
//! ## State machine
//!
//! ```text
//!            compile_dirty()                 last report / timeout
//!   Idle ──────────────────────> Building(n) ─────────────────────> Idle
//!    ^   (0 units: stay Idle)        │  report: n -> n-1                │
//!    │                               │  compile_dirty(): Busy           │
//!    └────────── reset() ────────────┴──────────────────────────────────┘
//! ```
//!
//! Every method runs on the session tick thread. Backends report through a
//! [`ReportSink`] which must post the report back to that thread rather than
//! call into the orchestrator directly.

mod state;

pub use state::{
    BuildPhase, CommitSummary, Completion, FailurePolicy, OrchestratorOptions, TriggerOutcome,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::backend::{
    BuildCompletion, BuildReport, BuildTicket, CompileBackend, ReportSink, Severity,
};
use crate::dirty::{DirtyTracker, Marked};
use crate::notifications::{BuildEvent, BuildEventBroadcaster};
use crate::unit::{BuildUnit, OwnershipPolicy, RebuildStats, RegistryError, UnitRegistry};
use state::{BuildState, PendingBuild};

/// Owns the registry and dirty tracker and drives build cycles.
pub struct BuildOrchestrator {
    registry: UnitRegistry,
    tracker: DirtyTracker,
    backend: Arc<dyn CompileBackend>,
    sink: ReportSink,
    broadcaster: Option<BuildEventBroadcaster>,
    options: OrchestratorOptions,
    state: BuildState,
    /// Bumped on every reset; stale reports carry an older epoch.
    epoch: u64,
    last_cycle: u64,
}

impl BuildOrchestrator {
    /// Create an idle orchestrator with an empty registry.
    ///
    /// `sink` receives every [`BuildReport`]; it is called from backend
    /// threads and must hand the report back to whoever owns the orchestrator.
    pub fn new(root: impl AsRef<Path>, backend: Arc<dyn CompileBackend>, sink: ReportSink) -> Self {
        Self {
            registry: UnitRegistry::new(OwnershipPolicy::default()),
            tracker: DirtyTracker::new(root),
            backend,
            sink,
            broadcaster: None,
            options: OrchestratorOptions::default(),
            state: BuildState::Idle,
            epoch: 0,
            last_cycle: 0,
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ownership(mut self, policy: OwnershipPolicy) -> Self {
        self.registry = UnitRegistry::new(policy);
        self
    }

    /// Set the event broadcaster.
    pub fn with_broadcaster(mut self, broadcaster: BuildEventBroadcaster) -> Self {
        self.set_broadcaster(broadcaster);
        self
    }

    pub fn set_broadcaster(&mut self, broadcaster: BuildEventBroadcaster) {
        self.broadcaster = Some(broadcaster);
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, BuildState::Idle)
    }

    pub fn phase(&self) -> BuildPhase {
        match &self.state {
            BuildState::Idle => BuildPhase::Idle,
            BuildState::Building(pending) => BuildPhase::Building {
                cycle: pending.ticket.cycle,
                outstanding: pending.outstanding.len(),
            },
        }
    }

    /// Units still building in the current cycle.
    pub fn outstanding_units(&self) -> Vec<String> {
        match &self.state {
            BuildState::Idle => Vec::new(),
            BuildState::Building(pending) => pending.outstanding.iter().cloned().collect(),
        }
    }

    fn broadcast(&self, event: BuildEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(event);
        }
    }

    /// Record a changed file.
    pub fn mark_dirty(&mut self, path: impl AsRef<Path>) -> Marked {
        let path = path.as_ref();
        let marked = self.tracker.mark(path);
        if marked == Marked::OutsideRoot {
            return marked;
        }

        // A change to a file that is part of the in-flight snapshot must
        // survive the commit, otherwise the edit is lost.
        if let BuildState::Building(pending) = &mut self.state {
            if let Some(normalized) = self.tracker.normalize(path) {
                if pending.snapshot.contains(&normalized)
                    && pending.redirtied.insert(normalized.clone())
                {
                    crate::debug_event!(
                        "orchestrator",
                        "re-dirtied during build",
                        "{}",
                        normalized.display()
                    );
                }
            }
        }

        if marked == Marked::Added {
            crate::debug_event!("dirty", "marked", "{}", path.display());
            if let Some(normalized) = self.tracker.normalize(path) {
                self.broadcast(BuildEvent::FileDirty { path: normalized });
            }
        }
        marked
    }

    /// Resolve dirty paths to owning units, de-duplicated in first-seen order.
    ///
    /// Returns the units and the number of unresolved paths.
    fn resolve(&self, snapshot: &[PathBuf]) -> (IndexMap<String, Arc<BuildUnit>>, usize) {
        let mut units = IndexMap::new();
        let mut unresolved = 0;
        for path in snapshot {
            match self.registry.resolve(path) {
                Some(unit) => {
                    units.entry(unit.name().to_string()).or_insert(unit);
                }
                None => {
                    unresolved += 1;
                    tracing::warn!(
                        "[orchestrator] no build unit owns {}, skipping",
                        path.display()
                    );
                }
            }
        }
        (units, unresolved)
    }

    /// Units the current dirty set would rebuild, without triggering anything.
    pub fn affected_units(&self) -> Vec<Arc<BuildUnit>> {
        let snapshot = self.tracker.snapshot();
        snapshot
            .iter()
            .filter_map(|p| self.registry.resolve(p))
            .fold(IndexMap::new(), |mut acc, unit| {
                acc.entry(unit.name().to_string()).or_insert(unit);
                acc
            })
            .into_values()
            .collect()
    }

    /// Rebuild every unit owning a dirty file.
    ///
    /// Only valid while idle; a trigger during a cycle is rejected.
    pub fn compile_dirty(&mut self) -> TriggerOutcome {
        if let BuildState::Building(pending) = &self.state {
            let outstanding = pending.outstanding.len();
            tracing::warn!(
                "[orchestrator] cycle {} still building ({outstanding} outstanding), trigger ignored",
                pending.ticket.cycle
            );
            self.broadcast(BuildEvent::TriggerRejected { outstanding });
            return TriggerOutcome::Busy { outstanding };
        }

        let started = Instant::now();
        let snapshot = self.tracker.snapshot();
        let (units, unresolved) = self.resolve(&snapshot);

        if units.is_empty() {
            crate::log_event!(
                "orchestrator",
                "nothing to build",
                "{} dirty, {unresolved} unresolved, {}ms",
                snapshot.len(),
                started.elapsed().as_millis()
            );
            self.broadcast(BuildEvent::NothingToBuild {
                dirty: snapshot.len(),
                unresolved,
            });
            return TriggerOutcome::NothingToBuild {
                dirty: snapshot.len(),
                unresolved,
            };
        }

        self.last_cycle += 1;
        let ticket = BuildTicket {
            epoch: self.epoch,
            cycle: self.last_cycle,
        };
        let names: Vec<String> = units.keys().cloned().collect();
        let files = snapshot.len();
        let dispatch: Vec<Arc<BuildUnit>> = units.values().cloned().collect();

        self.state = BuildState::Building(PendingBuild::new(
            ticket,
            snapshot,
            units,
            started,
            self.options.timeout,
        ));

        crate::log_event!(
            "orchestrator",
            "building",
            "cycle {ticket}: {} units from {files} dirty files",
            names.len()
        );
        self.broadcast(BuildEvent::CycleStarted {
            cycle: ticket.cycle,
            units: names.clone(),
        });

        for unit in dispatch {
            crate::log_event!(
                "orchestrator",
                "compile",
                "{}: {} sources, {} refs, out {}",
                unit.name(),
                unit.sources().len(),
                unit.references().len(),
                unit.output().display()
            );
            let completion = BuildCompletion::new(ticket, &unit, Arc::clone(&self.sink));
            self.backend.build(unit, completion);
        }

        TriggerOutcome::Started {
            cycle: ticket.cycle,
            units: names,
            files,
        }
    }

    /// Account for one unit's report.
    pub fn on_build_finished(&mut self, report: BuildReport) -> Completion {
        let BuildState::Building(pending) = &mut self.state else {
            crate::debug_event!(
                "orchestrator",
                "stale report",
                "{} ({}) while idle",
                report.unit,
                report.ticket
            );
            return Completion::Stale;
        };

        if pending.ticket != report.ticket {
            crate::debug_event!(
                "orchestrator",
                "stale report",
                "{} ({}), current cycle {}",
                report.unit,
                report.ticket,
                pending.ticket
            );
            return Completion::Stale;
        }

        if !pending.outstanding.shift_remove(&report.unit) {
            tracing::warn!(
                "[orchestrator] duplicate or unexpected report for '{}' in cycle {}",
                report.unit,
                report.ticket
            );
            return Completion::Duplicate;
        }

        for diagnostic in &report.diagnostics {
            match diagnostic.severity {
                Severity::Error => tracing::error!("[{}] {diagnostic}", report.unit),
                Severity::Warning => tracing::warn!("[{}] {diagnostic}", report.unit),
                Severity::Info => tracing::debug!("[{}] {diagnostic}", report.unit),
            }
        }

        let succeeded = report.succeeded();
        if succeeded {
            crate::log_event!(
                "orchestrator",
                "compiled",
                "{} -> {} in {}ms",
                report.unit,
                report.output.display(),
                report.elapsed.as_millis()
            );
        } else {
            tracing::error!(
                "[orchestrator] '{}' failed with {} errors",
                report.unit,
                report.error_count()
            );
            pending.failed.insert(report.unit.clone());
        }

        let remaining = pending.outstanding.len();
        self.broadcast(BuildEvent::UnitFinished {
            cycle: report.ticket.cycle,
            unit: report.unit.clone(),
            succeeded,
            errors: report.error_count(),
            warnings: report.warning_count(),
        });

        if remaining > 0 {
            return Completion::Pending {
                outstanding: remaining,
            };
        }

        match std::mem::take(&mut self.state) {
            BuildState::Building(pending) => Completion::Committed(self.commit(pending)),
            BuildState::Idle => Completion::Stale,
        }
    }

    /// Fail the in-flight cycle if its deadline passed.
    pub fn check_timeout(&mut self, now: Instant) -> Option<CommitSummary> {
        let timeout = self.options.timeout?;
        let BuildState::Building(pending) = &mut self.state else {
            return None;
        };
        if pending.deadline.is_none_or(|deadline| now < deadline) {
            return None;
        }

        let timed_out: Vec<String> = pending.outstanding.drain(..).collect();
        for unit in &timed_out {
            tracing::error!(
                "[orchestrator] '{unit}' did not report within {}s, treating as failed",
                timeout.as_secs()
            );
            pending.failed.insert(unit.clone());
        }
        pending.timed_out = timed_out.clone();
        let ticket = pending.ticket;
        let cycle = ticket.cycle;
        self.backend.cancel(ticket);

        self.broadcast(BuildEvent::CycleTimedOut {
            cycle,
            units: timed_out,
        });

        match std::mem::take(&mut self.state) {
            BuildState::Building(pending) => Some(self.commit(pending)),
            BuildState::Idle => None,
        }
    }

    /// Update dirty state for a finished cycle. State is already Idle.
    fn commit(&mut self, pending: PendingBuild) -> CommitSummary {
        let mut keep: HashSet<&PathBuf> = pending.redirtied.iter().collect();
        if self.options.failure_policy == FailurePolicy::RetainFailed {
            for path in &pending.snapshot {
                let failed_owner = self
                    .registry
                    .resolve(path)
                    .is_some_and(|unit| pending.failed.contains(unit.name()));
                if failed_owner {
                    keep.insert(path);
                }
            }
        }

        let to_clear: Vec<&PathBuf> = pending
            .snapshot
            .iter()
            .filter(|p| !keep.contains(p))
            .collect();
        let cleared = self.tracker.remove_all(to_clear.iter().copied());
        let retained = pending.snapshot.len() - to_clear.len();

        let summary = CommitSummary {
            cycle: pending.ticket.cycle,
            units: pending.units.len(),
            failed: pending.failed.iter().cloned().collect(),
            timed_out: pending.timed_out,
            cleared,
            retained,
            elapsed: pending.started.elapsed(),
        };

        if summary.succeeded() {
            crate::log_event!(
                "orchestrator",
                "committed",
                "cycle {}: {} units, cleared {}, {}ms",
                summary.cycle,
                summary.units,
                summary.cleared,
                summary.elapsed.as_millis()
            );
        } else {
            tracing::warn!(
                "[orchestrator] cycle {} committed with {} of {} units failed ({}), cleared {}, retained {}",
                summary.cycle,
                summary.failed.len(),
                summary.units,
                summary.failed.join(", "),
                summary.cleared,
                summary.retained
            );
        }

        self.broadcast(BuildEvent::CycleCommitted {
            cycle: summary.cycle,
            cleared: summary.cleared,
            retained: summary.retained,
            failed: summary.failed.clone(),
            elapsed: summary.elapsed,
        });
        summary
    }

    /// Drop the in-flight cycle, if any. Late reports become stale.
    fn discard_pending(&mut self) {
        self.epoch += 1;
        if let BuildState::Building(pending) = std::mem::take(&mut self.state) {
            crate::log_event!(
                "orchestrator",
                "discarded",
                "cycle {} with {} outstanding",
                pending.ticket,
                pending.outstanding.len()
            );
            self.backend.cancel(pending.ticket);
        }
    }

    /// Discard in-flight bookkeeping, clear dirty state and rebuild the registry.
    ///
    /// Valid in any state. On error the registry is left empty.
    pub fn reset(
        &mut self,
        units: impl IntoIterator<Item = BuildUnit>,
    ) -> Result<RebuildStats, RegistryError> {
        self.discard_pending();
        self.tracker.clear();
        let result = self.registry.rebuild(units);
        self.broadcast(BuildEvent::Reset { epoch: self.epoch });
        result
    }

    /// Discard everything. The orchestrator stays usable after a `reset`.
    pub fn tear_down(&mut self) {
        self.discard_pending();
        self.tracker.clear();
        self.registry.clear();
    }
}
