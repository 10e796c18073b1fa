//! Build lifecycle notifications.
//!
//! The orchestrator publishes what it does on a broadcast channel so the CLI
//! (or an embedding host) can render progress without reaching into engine
//! state.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A path became dirty.
    FileDirty { path: PathBuf },
    /// A trigger resolved to zero units.
    NothingToBuild { dirty: usize, unresolved: usize },
    /// A trigger was refused because a cycle is in flight.
    TriggerRejected { outstanding: usize },
    /// Builds were dispatched.
    CycleStarted { cycle: u64, units: Vec<String> },
    /// One unit reported back.
    UnitFinished {
        cycle: u64,
        unit: String,
        succeeded: bool,
        errors: usize,
        warnings: usize,
    },
    /// Units that never reported before the deadline.
    CycleTimedOut { cycle: u64, units: Vec<String> },
    /// All units reported; dirty state was updated.
    CycleCommitted {
        cycle: u64,
        cleared: usize,
        retained: usize,
        failed: Vec<String>,
        elapsed: Duration,
    },
    /// The orchestrator was reset.
    Reset { epoch: u64 },
}

/// Fans build events out to any number of subscribers.
#[derive(Clone)]
pub struct BuildEventBroadcaster {
    sender: broadcast::Sender<BuildEvent>,
}

impl BuildEventBroadcaster {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers
    pub fn send(&self, event: BuildEvent) {
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "to {count} subscribers");
            }
            Err(_) => {
                // No receivers, this is fine
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BuildEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for BuildEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildEventBroadcaster")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
