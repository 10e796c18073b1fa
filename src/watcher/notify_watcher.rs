//! `notify`-backed change watcher.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::{ChangeSink, ChangeWatcher, WatchError};
use crate::paths;

/// Recursive watcher on a single root, filtered to one file extension.
pub struct NotifyWatcher {
    /// Extension WITHOUT the dot.
    extension: String,
    /// The underlying file watcher (dropping it ends the subscription).
    watcher: Option<notify::RecommendedWatcher>,
    root: Option<PathBuf>,
}

impl NotifyWatcher {
    /// Create an inactive watcher for files with `extension` (e.g. `"cs"`).
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            watcher: None,
            root: None,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Root currently being watched, if active.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

/// Paths in `event` that should be reported as changed.
///
/// Only writes and creations count. Removals are not rebuild triggers; a
/// deleted file shows up again as a create if it comes back.
pub(crate) fn changed_paths(event: &Event, extension: &str) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| paths::has_extension(p, extension))
            .cloned()
            .collect(),
        EventKind::Remove(_) => {
            for path in &event.paths {
                crate::debug_event!("watcher", "removed (ignored)", "{}", path.display());
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn name(&self) -> &str {
        "notify"
    }

    fn init(&mut self, root: &Path, sink: ChangeSink) -> Result<(), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::RootMissing {
                path: root.to_path_buf(),
            });
        }

        // Replace any previous subscription
        self.tear_down();

        let extension = self.extension.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for path in changed_paths(&event, &extension) {
                        sink(path);
                    }
                }
                Err(e) => {
                    tracing::error!("[watcher] file watch error: {e}");
                }
            })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        crate::log_event!(
            "watcher",
            "watching",
            "{} (*.{})",
            root.display(),
            self.extension
        );
        self.watcher = Some(watcher);
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    fn tear_down(&mut self) {
        if self.watcher.take().is_some() {
            if let Some(root) = self.root.take() {
                crate::debug_event!("watcher", "stopped", "{}", root.display());
            }
        }
    }

    fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_changed_paths_filters_extension() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/p/a.cs", "/p/a.cs.meta", "/p/b.CS", "/p/notes.txt"],
        );
        assert_eq!(
            changed_paths(&ev, "cs"),
            vec![PathBuf::from("/p/a.cs"), PathBuf::from("/p/b.CS")]
        );
    }

    #[test]
    fn test_changed_paths_accepts_create() {
        let ev = event(EventKind::Create(CreateKind::File), &["/p/new.cs"]);
        assert_eq!(changed_paths(&ev, "cs"), vec![PathBuf::from("/p/new.cs")]);
    }

    #[test]
    fn test_changed_paths_ignores_remove() {
        let ev = event(EventKind::Remove(RemoveKind::File), &["/p/gone.cs"]);
        assert!(changed_paths(&ev, "cs").is_empty());
    }

    #[test]
    fn test_init_rejects_missing_root() {
        let mut watcher = NotifyWatcher::new(".cs");
        assert_eq!(watcher.extension(), "cs");
        let sink: ChangeSink = Arc::new(|_| {});
        let err = watcher
            .init(Path::new("/definitely/not/a/dir"), sink)
            .unwrap_err();
        assert!(matches!(err, WatchError::RootMissing { .. }));
        assert!(!watcher.is_active());
    }

    #[test]
    fn test_watcher_reports_written_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let nested = temp_dir.path().join("Assets/Scripts");
        std::fs::create_dir_all(&nested).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let sink: ChangeSink = Arc::new(move |path| {
            let _ = tx.send(path);
        });

        let mut watcher = NotifyWatcher::new("cs");
        watcher.init(temp_dir.path(), sink).unwrap();
        assert!(watcher.is_active());

        let file = nested.join("Player.cs");
        std::fs::write(&file, "class Player {}").unwrap();
        std::fs::write(nested.join("ignored.txt"), "x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline {
            if let Ok(path) = rx.recv_timeout(Duration::from_millis(100)) {
                assert!(paths::has_extension(&path, "cs"));
                if path.file_name() == file.file_name() {
                    seen = true;
                    break;
                }
            }
        }
        assert!(seen, "expected a change event for {}", file.display());

        watcher.tear_down();
        assert!(!watcher.is_active());
        // Second tear_down is harmless
        watcher.tear_down();
    }
}
