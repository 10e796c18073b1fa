//! Single-consumer queue of deferred actions.
//!
//! Watcher callbacks and compile backends run on threads we do not control.
//! Instead of locking the engine state, they post closures here and the
//! session tick runs them on one thread, in FIFO order.
//!
//! ```text
//! notify thread ─┐
//! backend task  ─┼─> EventSender::enqueue ──> [channel] ──> drain_and_execute_all(&mut ctx)
//! CLI / host    ─┘                                         (tick thread only)
//! ```

use crossbeam_channel::{Receiver, Sender, unbounded};

/// A deferred action run against the consumer's context.
pub type Action<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Consumer side of the queue. Not `Clone`: there is exactly one drainer.
pub struct EventQueue<C> {
    tx: Sender<Action<C>>,
    rx: Receiver<Action<C>>,
}

/// Producer handle. Cheap to clone and safe to use from any thread.
pub struct EventSender<C> {
    tx: Sender<Action<C>>,
}

impl<C> Clone for EventSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> std::fmt::Debug for EventSender<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("pending", &self.tx.len())
            .finish()
    }
}

impl<C> EventQueue<C> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Get a producer handle.
    pub fn sender(&self) -> EventSender<C> {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Enqueue from the consumer side.
    pub fn enqueue(&self, action: impl FnOnce(&mut C) + Send + 'static) {
        // Cannot fail: we hold the receiver
        let _ = self.tx.send(Box::new(action));
    }

    /// Number of queued actions.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every action that was queued when the drain began, in FIFO order.
    ///
    /// Actions enqueued while draining (including by the actions themselves)
    /// are left for the next call. Returns how many actions ran.
    pub fn drain_and_execute_all(&self, ctx: &mut C) -> usize {
        let batch = self.rx.len();
        let mut executed = 0;
        for _ in 0..batch {
            match self.rx.try_recv() {
                Ok(action) => {
                    action(ctx);
                    executed += 1;
                }
                Err(_) => break,
            }
        }
        executed
    }
}

impl<C> Default for EventQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventSender<C> {
    /// Post an action for the consumer thread.
    ///
    /// Returns `false` if the queue has been dropped; the action is discarded.
    pub fn enqueue(&self, action: impl FnOnce(&mut C) + Send + 'static) -> bool {
        self.tx.send(Box::new(action)).is_ok()
    }
}
