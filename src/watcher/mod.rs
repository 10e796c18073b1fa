//! File change notification for dirty tracking.
//!
//! # Architecture
//!
//! ```text
//! NotifyWatcher (notify thread)
//!   - recursive watch on the root
//!   - extension filter
//!   - Modify/Create -> ChangeSink(path)
//!         |
//!   ChangeSink posts onto the session EventQueue
//!         |
//!   DirtyTracker::mark (tick thread)
//! ```
//!
//! The watcher does not debounce. Repeated events for one edit collapse in
//! the dirty tracker.

mod error;
mod handler;
mod notify_watcher;

pub use error::WatchError;
pub use handler::{ChangeSink, ChangeWatcher};
pub use notify_watcher::NotifyWatcher;
