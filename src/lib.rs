//! Incremental build orchestration.
//!
//! Tracks changed source files, maps them to the build units that own them,
//! and rebuilds only those units through a pluggable [`CompileBackend`].

pub mod backend;
pub mod cli;
pub mod config;
pub mod dirty;
pub mod logging;
pub mod notifications;
pub mod orchestrator;
pub mod paths;
pub mod queue;
pub mod session;
pub mod unit;
pub mod watcher;

pub use backend::{
    BuildCompletion, BuildReport, BuildTicket, CommandBackend, CompileBackend, DeferredBackend,
    Diagnostic, DryRunBackend, Severity,
};
pub use config::Settings;
pub use dirty::{DirtyTracker, Marked};
pub use notifications::{BuildEvent, BuildEventBroadcaster};
pub use orchestrator::{
    BuildOrchestrator, BuildPhase, CommitSummary, Completion, FailurePolicy, OrchestratorOptions,
    TriggerOutcome,
};
pub use queue::{EventQueue, EventSender};
pub use session::{Session, SessionConfig, SessionDriver, SessionError, SessionHandle};
pub use unit::{
    BuildUnit, ManifestUnitSource, OwnershipPolicy, StaticUnitSource, UnitRegistry, UnitSource,
};
pub use watcher::{ChangeWatcher, NotifyWatcher};
