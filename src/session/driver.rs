//! Tick driver and cross-thread handle for a [`Session`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};

use super::{Session, SessionConfig, SessionError};
use crate::backend::CompileBackend;
use crate::notifications::BuildEventBroadcaster;
use crate::queue::{EventQueue, EventSender};
use crate::unit::{RebuildStats, UnitSource};
use crate::watcher::ChangeWatcher;

/// Owns a session and the queue feeding it.
pub struct SessionDriver {
    queue: EventQueue<Session>,
    session: Session,
    tick_interval: Duration,
}

impl SessionDriver {
    pub fn new(
        config: SessionConfig,
        source: Box<dyn UnitSource>,
        backend: Arc<dyn CompileBackend>,
    ) -> Self {
        let queue = EventQueue::new();
        let tick_interval = config.tick_interval;
        let session = Session::new(config, source, backend, queue.sender());
        Self {
            queue,
            session,
            tick_interval,
        }
    }

    /// Attach a change watcher. It starts on [`start`](Self::start).
    pub fn with_watcher(mut self, watcher: Box<dyn ChangeWatcher>) -> Self {
        self.session.set_watcher(watcher);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: BuildEventBroadcaster) -> Self {
        self.session.orchestrator_mut().set_broadcaster(broadcaster);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.queue.sender(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Actions waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Load units, build the registry and start watching.
    pub fn start(&mut self) -> Result<RebuildStats, SessionError> {
        crate::log_event!("session", "starting", "{}", self.session.root().display());
        self.session.reset_state()
    }

    /// Run queued actions, then timeouts, then auto-build.
    ///
    /// Returns the number of queued actions executed.
    pub fn tick(&mut self, now: Instant) -> usize {
        let executed = self.queue.drain_and_execute_all(&mut self.session);
        self.session.check_timeout(now);
        self.session.maybe_auto_build(now);
        executed
    }

    /// Tick until `shutdown` resolves or a handle requests shutdown, then
    /// tear the session down.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        crate::log_event!("session", "running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                    if self.session.shutdown_requested() {
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        self.session.tear_down();
        crate::log_event!("session", "stopped");
    }

    /// Tick until no cycle is in flight and the queue is empty.
    pub async fn run_until_idle(&mut self) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick(Instant::now());
            if self.session.is_idle() && self.queue.pending() == 0 {
                break;
            }
        }
    }
}

/// Cloneable handle for driving a session from any thread.
///
/// Every call only enqueues; the effect happens on the next tick. Calls
/// return `false` once the driver is gone.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    events: EventSender<Session>,
}

impl SessionHandle {
    pub fn mark_dirty(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.events.enqueue(move |session: &mut Session| {
            session.mark_dirty(&path);
        })
    }

    /// Build everything dirty now.
    pub fn compile_dirty_now(&self) -> bool {
        self.events.enqueue(|session: &mut Session| {
            session.compile_dirty_now();
        })
    }

    /// Reload units and start over. Failures are logged.
    pub fn reset_state(&self) -> bool {
        self.events.enqueue(|session: &mut Session| {
            if let Err(e) = session.reset_state() {
                tracing::error!("[session] reset failed: {e}");
            }
        })
    }

    pub fn shutdown(&self) -> bool {
        self.events.enqueue(|session: &mut Session| session.request_shutdown())
    }

    /// Run an arbitrary action on the session thread.
    pub fn enqueue(&self, action: impl FnOnce(&mut Session) + Send + 'static) -> bool {
        self.events.enqueue(action)
    }
}
