//! Path normalization for dirty tracking and unit ownership lookup.
//!
//! Both the unit registry and the dirty tracker key on the same canonical
//! form, so every path that enters the engine goes through [`normalize`]:
//! - relative paths are joined onto the watched root
//! - `.` components are dropped, `..` components pop the previous component
//!
//! Normalization is purely lexical. Files reported by the watcher may
//! already be gone (editor swap files, renames), so we never touch the
//! filesystem here.

use std::path::{Component, Path, PathBuf};

/// Normalize a path into the canonical key form used across the engine.
///
/// If `path` is relative it is resolved against `root` first.
pub fn normalize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or a prefix
                if matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check a file extension, case-insensitively.
///
/// `ext` is given WITHOUT the dot (e.g. `"cs"`, `"rs"`).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
}

/// Normalizes paths against a fixed watched root.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    root: PathBuf,
}

impl PathNormalizer {
    /// Create a normalizer for the given root.
    ///
    /// A relative root is resolved against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = if root.is_relative() {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
            normalize(&cwd, root)
        } else {
            normalize(root, root)
        };
        Self { root: absolute }
    }

    /// The watched root in normalized form.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize `path`, returning `None` when it falls outside the root.
    pub fn normalize(&self, path: &Path) -> Option<PathBuf> {
        let normalized = normalize(&self.root, path);
        normalized.starts_with(&self.root).then_some(normalized)
    }

    /// Normalize without the root check.
    pub fn normalize_lossy(&self, path: &Path) -> PathBuf {
        normalize(&self.root, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_path() {
        let root = Path::new("/project");
        let result = normalize(root, Path::new("Assets/Scripts/Player.cs"));
        assert_eq!(result, PathBuf::from("/project/Assets/Scripts/Player.cs"));
    }

    #[test]
    fn test_normalize_absolute_path_unchanged() {
        let root = Path::new("/project");
        let result = normalize(root, Path::new("/other/Foo.cs"));
        assert_eq!(result, PathBuf::from("/other/Foo.cs"));
    }

    #[test]
    fn test_normalize_collapses_dot_components() {
        let root = Path::new("/project");
        let result = normalize(root, Path::new("./Assets/../Assets/./Game//Enemy.cs"));
        assert_eq!(result, PathBuf::from("/project/Assets/Game/Enemy.cs"));
    }

    #[test]
    fn test_normalize_parent_does_not_escape_root_dir() {
        let result = normalize(Path::new("/"), Path::new("../../etc/passwd"));
        assert_eq!(result, PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn test_normalizer_rejects_outside_root() {
        let normalizer = PathNormalizer::new("/project");
        assert!(normalizer.normalize(Path::new("/elsewhere/a.cs")).is_none());
        assert!(normalizer.normalize(Path::new("../sibling/a.cs")).is_none());
        assert_eq!(
            normalizer.normalize(Path::new("src/a.cs")),
            Some(PathBuf::from("/project/src/a.cs"))
        );
    }

    #[test]
    fn test_normalizer_rejects_prefix_lookalike() {
        // "/project-old" starts with the string "/project" but is not under it
        let normalizer = PathNormalizer::new("/project");
        assert!(normalizer.normalize(Path::new("/project-old/a.cs")).is_none());
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("/a/B.cs"), "cs"));
        assert!(has_extension(Path::new("/a/B.CS"), "cs"));
        assert!(has_extension(Path::new("/a/B.cs"), ".cs"));
        assert!(!has_extension(Path::new("/a/B.cs.meta"), "cs"));
        assert!(!has_extension(Path::new("/a/Makefile"), "cs"));
    }
}
