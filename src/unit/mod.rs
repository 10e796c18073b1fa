//! Build units and the file-to-unit ownership registry.
//!
//! A build unit is a compilable grouping of source files producing one
//! output artifact. Units are immutable for the lifetime of a session and
//! shared as `Arc<BuildUnit>` between the registry and in-flight builds.

mod error;
mod manifest;
mod registry;

pub use error::{RegistryError, UnitError};
pub use manifest::{ManifestUnitSource, StaticUnitSource, UnitSource};
pub use registry::{OwnershipPolicy, RebuildStats, UnitRegistry};

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::paths;

/// A compilable grouping of source files producing one output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    name: String,
    sources: Vec<PathBuf>,
    references: Vec<String>,
    defines: Vec<String>,
    output: PathBuf,
}

impl BuildUnit {
    /// Start describing a unit with the given unique name.
    pub fn builder(name: impl Into<String>) -> BuildUnitBuilder {
        BuildUnitBuilder {
            name: name.into(),
            sources: IndexSet::new(),
            references: Vec::new(),
            defines: Vec::new(),
            output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source files in declaration order. Never empty.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Whether `path` (already normalized) is one of this unit's sources.
    pub fn owns(&self, path: &Path) -> bool {
        self.sources.iter().any(|p| p == path)
    }
}

impl fmt::Display for BuildUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`BuildUnit`].
///
/// Sources must be absolute. They are normalized on [`build`](Self::build)
/// and de-duplicated while keeping first-insertion order.
#[derive(Debug)]
pub struct BuildUnitBuilder {
    name: String,
    sources: IndexSet<PathBuf>,
    references: Vec<String>,
    defines: Vec<String>,
    output: Option<PathBuf>,
}

impl BuildUnitBuilder {
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(path.into());
        self
    }

    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(references.into_iter().map(Into::into));
        self
    }

    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    pub fn defines<I, S>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defines.extend(defines.into_iter().map(Into::into));
        self
    }

    /// Output artifact path. Defaults to `<name>.dll` when not set.
    ///
    /// Absolute outputs are normalized; relative ones are kept as given.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn build(self) -> Result<BuildUnit, UnitError> {
        if self.sources.is_empty() {
            return Err(UnitError::EmptyUnit { name: self.name });
        }

        let mut sources = IndexSet::with_capacity(self.sources.len());
        for source in self.sources {
            if !source.is_absolute() {
                return Err(UnitError::RelativeSource {
                    name: self.name,
                    path: source,
                });
            }
            sources.insert(paths::normalize(Path::new("/"), &source));
        }

        let output = match self.output {
            Some(path) if path.is_absolute() => paths::normalize(Path::new("/"), &path),
            Some(path) => path,
            None => PathBuf::from(format!("{}.dll", self.name)),
        };
        Ok(BuildUnit {
            name: self.name,
            sources: sources.into_iter().collect(),
            references: self.references,
            defines: self.defines,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_dedupes_sources_in_order() {
        let unit = BuildUnit::builder("Game")
            .source("/p/b.cs")
            .source("/p/a.cs")
            .source("/p/b.cs")
            .output("/p/Library/Game.dll")
            .build()
            .unwrap();

        assert_eq!(
            unit.sources(),
            &[PathBuf::from("/p/b.cs"), PathBuf::from("/p/a.cs")]
        );
        assert!(unit.owns(Path::new("/p/a.cs")));
        assert!(!unit.owns(Path::new("/p/c.cs")));
    }

    #[test]
    fn test_builder_rejects_empty_unit() {
        let err = BuildUnit::builder("Empty").build().unwrap_err();
        assert!(matches!(err, UnitError::EmptyUnit { name } if name == "Empty"));
    }

    #[test]
    fn test_default_output_uses_name() {
        let unit = BuildUnit::builder("Tools").source("/p/t.cs").build().unwrap();
        assert_eq!(unit.output(), Path::new("Tools.dll"));
        assert_eq!(unit.to_string(), "Tools");
    }

    #[test]
    fn test_builder_normalizes_sources_before_dedupe() {
        let unit = BuildUnit::builder("A")
            .sources(["/p/./x.cs", "/p/x.cs", "/p/sub/../y.cs"])
            .output("/p/out/../Library/A.dll")
            .build()
            .unwrap();

        assert_eq!(
            unit.sources(),
            &[PathBuf::from("/p/x.cs"), PathBuf::from("/p/y.cs")]
        );
        assert_eq!(unit.output(), Path::new("/p/Library/A.dll"));
        assert!(unit.owns(Path::new("/p/y.cs")));
    }

    #[test]
    fn test_builder_rejects_relative_source() {
        let err = BuildUnit::builder("A")
            .source("/p/x.cs")
            .source("Scripts/y.cs")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            UnitError::RelativeSource { name, path } if name == "A" && path == Path::new("Scripts/y.cs")
        ));
    }
}
