//! Orchestrator state, policies and per-cycle bookkeeping.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::backend::BuildTicket;
use crate::config::BuildConfig;
use crate::unit::BuildUnit;

/// What happens to the dirty files of a unit whose build failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the failed unit's files dirty so the next trigger retries them.
    #[default]
    RetainFailed,
    /// Clear the whole trigger snapshot regardless of failures.
    ClearAll,
}

/// Tunables for [`BuildOrchestrator`](super::BuildOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub failure_policy: FailurePolicy,
    /// Give up on units that have not reported after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
        }
    }
}

/// Observable orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Building { cycle: u64, outstanding: usize },
}

/// Result of a build trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Builds were dispatched for `units` (unit names, in dispatch order).
    Started { cycle: u64, units: Vec<String>, files: usize },
    /// No dirty file resolved to a unit; dirty state untouched.
    NothingToBuild { dirty: usize, unresolved: usize },
    /// A cycle is already in flight; the trigger was ignored.
    Busy { outstanding: usize },
}

/// Summary of a committed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub cycle: u64,
    pub units: usize,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
    /// Dirty paths removed from the tracker.
    pub cleared: usize,
    /// Snapshot paths left dirty (failed units, re-dirtied during the build).
    pub retained: usize,
    pub elapsed: Duration,
}

impl CommitSummary {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a completion report did to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Report belongs to a discarded or finished cycle; ignored.
    Stale,
    /// Unit already reported in this cycle; ignored.
    Duplicate,
    /// Counted; other units still outstanding.
    Pending { outstanding: usize },
    /// Last outstanding unit; the cycle committed.
    Committed(CommitSummary),
}

/// Bookkeeping for one in-flight trigger cycle.
#[derive(Debug)]
pub(crate) struct PendingBuild {
    pub ticket: BuildTicket,
    /// Dirty paths at trigger time, in dirty order.
    pub snapshot: IndexSet<PathBuf>,
    pub units: IndexMap<String, Arc<BuildUnit>>,
    pub outstanding: IndexSet<String>,
    pub failed: IndexSet<String>,
    pub timed_out: Vec<String>,
    /// Snapshot paths marked dirty again while building.
    pub redirtied: HashSet<PathBuf>,
    pub started: Instant,
    pub deadline: Option<Instant>,
}

impl PendingBuild {
    pub fn new(
        ticket: BuildTicket,
        snapshot: Vec<PathBuf>,
        units: IndexMap<String, Arc<BuildUnit>>,
        started: Instant,
        timeout: Option<Duration>,
    ) -> Self {
        let outstanding = units.keys().cloned().collect();
        Self {
            ticket,
            snapshot: snapshot.into_iter().collect(),
            units,
            outstanding,
            failed: IndexSet::new(),
            timed_out: Vec::new(),
            redirtied: HashSet::new(),
            started,
            deadline: timeout.map(|t| started + t),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) enum BuildState {
    #[default]
    Idle,
    Building(PendingBuild),
}
