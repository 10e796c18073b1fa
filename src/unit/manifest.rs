//! Sources of build unit definitions.
//!
//! The registry is rebuilt from a [`UnitSource`] at session start and on
//! every reset. The default source is a TOML manifest:
//!
//! ```toml
//! [[unit]]
//! name = "Game"
//! sources = ["Assets/Scripts/**/*.cs"]
//! references = ["Library/ScriptAssemblies/Core.dll"]
//! defines = ["UNITY_EDITOR", "DEBUG"]
//! output = "Library/ScriptAssemblies/Game.dll"
//! ```
//!
//! Source entries are either plain paths or glob patterns, relative to the
//! workspace root.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{BuildUnit, UnitError};
use crate::paths;

/// Provides the full list of build units for a session.
pub trait UnitSource: Send {
    /// Human readable description for logging.
    fn describe(&self) -> String;

    /// Load every unit. Called once per session start and once per reset.
    fn load_units(&self) -> Result<Vec<BuildUnit>, UnitError>;
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default, rename = "unit")]
    units: Vec<ManifestUnit>,
}

#[derive(Debug, Deserialize)]
struct ManifestUnit {
    name: String,
    sources: Vec<String>,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    defines: Vec<String>,
    output: Option<PathBuf>,
}

/// Loads units from a TOML manifest on disk.
#[derive(Debug, Clone)]
pub struct ManifestUnitSource {
    manifest: PathBuf,
    root: PathBuf,
}

impl ManifestUnitSource {
    /// `root` is the directory relative sources and outputs resolve against.
    pub fn new(manifest: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            root: root.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    /// Parse manifest text without touching the manifest path.
    pub fn parse(&self, content: &str) -> Result<Vec<BuildUnit>, UnitError> {
        let file: ManifestFile =
            toml::from_str(content).map_err(|e| UnitError::ManifestParse {
                path: self.manifest.clone(),
                reason: e.to_string(),
            })?;

        file.units
            .into_iter()
            .map(|entry| self.to_unit(entry))
            .collect()
    }

    fn to_unit(&self, entry: ManifestUnit) -> Result<BuildUnit, UnitError> {
        let mut sources = Vec::new();
        for pattern in &entry.sources {
            sources.extend(self.expand(&entry.name, pattern)?);
        }

        let output = entry
            .output
            .map(|p| paths::normalize(&self.root, &p))
            .unwrap_or_else(|| self.root.join(format!("{}.dll", entry.name)));

        BuildUnit::builder(entry.name)
            .sources(sources)
            .references(entry.references)
            .defines(entry.defines)
            .output(output)
            .build()
    }

    /// Full glob pattern for a source entry. Only the entry itself is
    /// pattern syntax; the root is escaped.
    fn glob_pattern(&self, pattern: &str) -> String {
        let root = paths::normalize(&self.root, Path::new(""));
        let full = paths::normalize(&root, Path::new(pattern));
        match full.strip_prefix(&root) {
            Ok(rest) => {
                let escaped = glob::Pattern::escape(&root.to_string_lossy());
                PathBuf::from(escaped).join(rest).to_string_lossy().into_owned()
            }
            Err(_) => full.to_string_lossy().into_owned(),
        }
    }

    /// Expand one source entry into normalized paths.
    ///
    /// Plain paths are kept even when the file does not exist yet; glob
    /// patterns only yield existing files, sorted for determinism.
    fn expand(&self, unit: &str, pattern: &str) -> Result<Vec<PathBuf>, UnitError> {
        if !pattern.contains(['*', '?', '[']) {
            return Ok(vec![paths::normalize(&self.root, Path::new(pattern))]);
        }

        let full = self.glob_pattern(pattern);
        let entries = glob::glob(&full).map_err(|e| UnitError::InvalidPattern {
            unit: unit.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut matched: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(paths::normalize(&self.root, &path)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("[units] unreadable match for '{pattern}': {e}");
                    None
                }
            })
            .collect();
        matched.sort();

        if matched.is_empty() {
            tracing::warn!("[units] pattern '{pattern}' in unit '{unit}' matched no files");
        }
        Ok(matched)
    }
}

impl UnitSource for ManifestUnitSource {
    fn describe(&self) -> String {
        format!("manifest {}", self.manifest.display())
    }

    fn load_units(&self) -> Result<Vec<BuildUnit>, UnitError> {
        let content =
            std::fs::read_to_string(&self.manifest).map_err(|source| UnitError::ManifestRead {
                path: self.manifest.clone(),
                source,
            })?;
        self.parse(&content)
    }
}

/// Fixed in-memory unit list, for embedding hosts that already know their units.
#[derive(Debug, Clone, Default)]
pub struct StaticUnitSource {
    units: Vec<BuildUnit>,
}

impl StaticUnitSource {
    pub fn new(units: Vec<BuildUnit>) -> Self {
        Self { units }
    }
}

impl UnitSource for StaticUnitSource {
    fn describe(&self) -> String {
        format!("{} static units", self.units.len())
    }

    fn load_units(&self) -> Result<Vec<BuildUnit>, UnitError> {
        Ok(self.units.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_plain_sources() {
        let source = ManifestUnitSource::new("/p/.dirtyc/units.toml", "/p");
        let units = source
            .parse(
                r#"
[[unit]]
name = "Game"
sources = ["Assets/Player.cs", "./Assets/Enemy.cs"]
references = ["Core.dll"]
defines = ["DEBUG"]
output = "Library/Game.dll"

[[unit]]
name = "Editor"
sources = ["/p/Editor/Tool.cs"]
"#,
            )
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name(), "Game");
        assert_eq!(
            units[0].sources(),
            &[
                PathBuf::from("/p/Assets/Player.cs"),
                PathBuf::from("/p/Assets/Enemy.cs")
            ]
        );
        assert_eq!(units[0].references(), &["Core.dll".to_string()]);
        assert_eq!(units[0].defines(), &["DEBUG".to_string()]);
        assert_eq!(units[0].output(), Path::new("/p/Library/Game.dll"));
        assert_eq!(units[1].output(), Path::new("/p/Editor.dll"));
    }

    #[test]
    fn test_parse_reports_manifest_errors() {
        let source = ManifestUnitSource::new("units.toml", "/p");
        let err = source.parse("[[unit]]\nname = 3").unwrap_err();
        assert!(matches!(err, UnitError::ManifestParse { .. }));
    }

    #[test]
    fn test_unit_without_sources_is_rejected() {
        let source = ManifestUnitSource::new("units.toml", "/p");
        let err = source
            .parse("[[unit]]\nname = \"Empty\"\nsources = []")
            .unwrap_err();
        assert!(matches!(err, UnitError::EmptyUnit { .. }));
    }

    #[test]
    fn test_glob_sources_expand_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::write(root.join("src/b.cs"), "").unwrap();
        fs::write(root.join("src/a.cs"), "").unwrap();
        fs::write(root.join("src/nested/c.cs"), "").unwrap();
        fs::write(root.join("src/readme.md"), "").unwrap();

        let manifest = root.join("units.toml");
        fs::write(
            &manifest,
            "[[unit]]\nname = \"Lib\"\nsources = [\"src/**/*.cs\"]\n",
        )
        .unwrap();

        let source = ManifestUnitSource::new(&manifest, root);
        let units = source.load_units().unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0].sources(),
            &[
                root.join("src/a.cs"),
                root.join("src/b.cs"),
                root.join("src/nested/c.cs"),
            ]
        );
    }

    #[test]
    fn test_glob_root_with_pattern_characters() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("game[1]");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.cs"), "").unwrap();
        fs::write(root.join("src/b.cs"), "").unwrap();

        let source = ManifestUnitSource::new(root.join("units.toml"), &root);
        let units = source
            .parse("[[unit]]\nname = \"Lib\"\nsources = [\"src/*.cs\"]\n")
            .unwrap();

        assert_eq!(units[0].sources(), &[root.join("src/a.cs"), root.join("src/b.cs")]);
    }

    #[test]
    fn test_missing_manifest() {
        let source = ManifestUnitSource::new("/definitely/not/here/units.toml", "/p");
        let err = source.load_units().unwrap_err();
        assert!(matches!(err, UnitError::ManifestRead { .. }));
    }
}
