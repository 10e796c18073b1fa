//! Watcher contract used by the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::WatchError;

/// Receives the path of every changed file.
///
/// Called on whatever thread the underlying notification mechanism uses,
/// so implementations must only hand the path off (e.g. enqueue it).
pub type ChangeSink = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Source of raw "path changed" events for a watched root.
pub trait ChangeWatcher: Send {
    /// Watcher name for logging.
    fn name(&self) -> &str;

    /// Start delivering events for files under `root` to `sink`.
    ///
    /// Calling `init` on an active watcher replaces the previous
    /// subscription.
    fn init(&mut self, root: &Path, sink: ChangeSink) -> Result<(), WatchError>;

    /// Stop delivering events. Harmless when not active.
    fn tear_down(&mut self);

    /// Whether a subscription is currently active.
    fn is_active(&self) -> bool;
}
