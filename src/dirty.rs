//! Deduplicated, insertion-ordered set of dirty source files.
//!
//! Watchers fire several times for one logical edit (auto-save, formatters,
//! atomic rename writes). The tracker absorbs that noise: marking a path
//! that is already dirty is a no-op, and the first-insertion order is kept
//! so builds are resolved in the order changes were first seen.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::paths::PathNormalizer;

/// Result of [`DirtyTracker::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marked {
    /// Path was not dirty before.
    Added,
    /// Path was already dirty; nothing changed.
    AlreadyDirty,
    /// Path normalizes to somewhere outside the watched root and was dropped.
    OutsideRoot,
}

/// Ordered set of normalized dirty paths.
#[derive(Debug)]
pub struct DirtyTracker {
    normalizer: PathNormalizer,
    files: IndexSet<PathBuf>,
}

impl DirtyTracker {
    /// Create an empty tracker for the given watched root.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            normalizer: PathNormalizer::new(root),
            files: IndexSet::new(),
        }
    }

    /// The normalized watched root.
    pub fn root(&self) -> &Path {
        self.normalizer.root()
    }

    /// Normalize `path` the same way [`mark`](Self::mark) does.
    pub fn normalize(&self, path: &Path) -> Option<PathBuf> {
        self.normalizer.normalize(path)
    }

    /// Record `path` as dirty. Idempotent.
    pub fn mark(&mut self, path: impl AsRef<Path>) -> Marked {
        let path = path.as_ref();
        let Some(normalized) = self.normalizer.normalize(path) else {
            crate::debug_event!("dirty", "outside root", "{}", path.display());
            return Marked::OutsideRoot;
        };

        if self.files.insert(normalized) {
            Marked::Added
        } else {
            Marked::AlreadyDirty
        }
    }

    /// Copy of the current contents in first-insertion order.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.files.iter().cloned().collect()
    }

    /// Take the current contents, leaving the tracker empty.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.files.drain(..).collect()
    }

    /// Remove every path in `paths`, keeping the order of what remains.
    ///
    /// Returns how many paths were actually removed.
    pub fn remove_all<'a>(&mut self, paths: impl IntoIterator<Item = &'a PathBuf>) -> usize {
        let mut removed = 0;
        for path in paths {
            if self.files.shift_remove(path) {
                removed += 1;
            }
        }
        removed
    }

    /// Forget every dirty path.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_deduplicates_in_first_insertion_order() {
        let mut tracker = DirtyTracker::new("/p");

        assert_eq!(tracker.mark("x.cs"), Marked::Added);
        assert_eq!(tracker.mark("y.cs"), Marked::Added);
        assert_eq!(tracker.mark("x.cs"), Marked::AlreadyDirty);
        assert_eq!(tracker.mark("/p/./x.cs"), Marked::AlreadyDirty);

        assert_eq!(
            tracker.snapshot(),
            vec![PathBuf::from("/p/x.cs"), PathBuf::from("/p/y.cs")]
        );
    }

    #[test]
    fn test_relative_and_absolute_forms_collapse() {
        let mut tracker = DirtyTracker::new("/p");
        tracker.mark("/p/src/a.cs");
        tracker.mark("src/../src/a.cs");
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains(Path::new("/p/src/a.cs")));
    }

    #[test]
    fn test_outside_root_is_dropped() {
        let mut tracker = DirtyTracker::new("/p");
        assert_eq!(tracker.mark("/q/a.cs"), Marked::OutsideRoot);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut tracker = DirtyTracker::new("/p");
        tracker.mark("a.cs");
        let snapshot = tracker.snapshot();
        tracker.mark("b.cs");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_drain_and_clear() {
        let mut tracker = DirtyTracker::new("/p");
        tracker.mark("a.cs");
        tracker.mark("b.cs");

        let drained = tracker.drain();
        assert_eq!(drained.len(), 2);
        assert!(tracker.is_empty());

        tracker.mark("c.cs");
        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_remove_all_keeps_remaining_order() {
        let mut tracker = DirtyTracker::new("/p");
        for name in ["a.cs", "b.cs", "c.cs", "d.cs"] {
            tracker.mark(name);
        }

        let removed = tracker.remove_all(&[
            PathBuf::from("/p/b.cs"),
            PathBuf::from("/p/d.cs"),
            PathBuf::from("/p/zzz.cs"),
        ]);

        assert_eq!(removed, 2);
        assert_eq!(
            tracker.snapshot(),
            vec![PathBuf::from("/p/a.cs"), PathBuf::from("/p/c.cs")]
        );
    }
}
