//! File-to-unit ownership registry.
//!
//! Built once per session from the full unit list and discarded wholesale on
//! reset. Lookups are exact matches on normalized paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{BuildUnit, RegistryError};

/// How to resolve a source file claimed by more than one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Fail the rebuild with [`RegistryError::DuplicateOwnership`].
    #[default]
    Reject,
    /// Keep the unit that appeared first in input order.
    FirstWins,
    /// Overwrite with the unit that appeared last in input order.
    LastWins,
}

/// Counters reported by a successful rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub units: usize,
    pub files: usize,
    /// Paths claimed by more than one unit and settled by the policy.
    pub conflicts: usize,
}

/// Mapping from normalized source path to owning build unit.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    /// path -> owning unit
    owners: HashMap<PathBuf, Arc<BuildUnit>>,
    /// name -> unit, in registration order
    units: IndexMap<String, Arc<BuildUnit>>,
    policy: OwnershipPolicy,
}

impl UnitRegistry {
    /// Create an empty registry.
    pub fn new(policy: OwnershipPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> OwnershipPolicy {
        self.policy
    }

    /// Clear the mapping and repopulate it from `units`.
    ///
    /// On error the registry is left empty.
    pub fn rebuild(
        &mut self,
        units: impl IntoIterator<Item = BuildUnit>,
    ) -> Result<RebuildStats, RegistryError> {
        self.clear();

        let result = self.populate(units);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn populate(
        &mut self,
        units: impl IntoIterator<Item = BuildUnit>,
    ) -> Result<RebuildStats, RegistryError> {
        let mut outputs: HashMap<PathBuf, String> = HashMap::new();
        let mut stats = RebuildStats::default();

        for unit in units {
            if self.units.contains_key(unit.name()) {
                return Err(RegistryError::DuplicateUnit {
                    name: unit.name().to_string(),
                });
            }
            if let Some(first) = outputs.get(unit.output()) {
                return Err(RegistryError::DuplicateOutput {
                    path: unit.output().to_path_buf(),
                    first: first.clone(),
                    second: unit.name().to_string(),
                });
            }
            outputs.insert(unit.output().to_path_buf(), unit.name().to_string());

            let unit = Arc::new(unit);
            for path in unit.sources() {
                match self.owners.get(path) {
                    None => {
                        self.owners.insert(path.clone(), Arc::clone(&unit));
                    }
                    Some(owner) => {
                        stats.conflicts += 1;
                        match self.policy {
                            OwnershipPolicy::Reject => {
                                return Err(RegistryError::DuplicateOwnership {
                                    path: path.clone(),
                                    owner: owner.name().to_string(),
                                    claimant: unit.name().to_string(),
                                });
                            }
                            OwnershipPolicy::FirstWins => {
                                tracing::warn!(
                                    "[registry] {} claimed by '{}' and '{}', keeping '{}'",
                                    path.display(),
                                    owner.name(),
                                    unit.name(),
                                    owner.name()
                                );
                            }
                            OwnershipPolicy::LastWins => {
                                tracing::warn!(
                                    "[registry] {} claimed by '{}' and '{}', keeping '{}'",
                                    path.display(),
                                    owner.name(),
                                    unit.name(),
                                    unit.name()
                                );
                                self.owners.insert(path.clone(), Arc::clone(&unit));
                            }
                        }
                    }
                }
            }
            self.units.insert(unit.name().to_string(), unit);
        }

        stats.units = self.units.len();
        stats.files = self.owners.len();
        crate::debug_event!(
            "registry",
            "rebuilt",
            "{} units, {} files",
            stats.units,
            stats.files
        );
        Ok(stats)
    }

    /// Look up the unit owning `path`.
    ///
    /// Unknown paths are not an error: callers log and skip them.
    pub fn resolve(&self, path: &Path) -> Option<Arc<BuildUnit>> {
        self.owners.get(path).cloned()
    }

    /// Look up a unit by name.
    pub fn unit(&self, name: &str) -> Option<Arc<BuildUnit>> {
        self.units.get(name).cloned()
    }

    /// All registered units in registration order.
    pub fn units(&self) -> impl Iterator<Item = &Arc<BuildUnit>> {
        self.units.values()
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of owned source files.
    pub fn file_count(&self) -> usize {
        self.owners.len()
    }

    /// Drop every mapping.
    pub fn clear(&mut self) {
        self.owners.clear();
        self.units.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, sources: &[&str]) -> BuildUnit {
        BuildUnit::builder(name)
            .sources(sources.iter().copied())
            .output(format!("/out/{name}.dll"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rebuild_and_resolve() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        let stats = registry
            .rebuild(vec![
                unit("A", &["/p/x.cs", "/p/z.cs"]),
                unit("B", &["/p/y.cs"]),
            ])
            .unwrap();

        assert_eq!(stats.units, 2);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.conflicts, 0);
        assert_eq!(registry.resolve(Path::new("/p/x.cs")).unwrap().name(), "A");
        assert_eq!(registry.resolve(Path::new("/p/z.cs")).unwrap().name(), "A");
        assert_eq!(registry.resolve(Path::new("/p/y.cs")).unwrap().name(), "B");
        assert!(registry.resolve(Path::new("/p/unknown.cs")).is_none());
    }

    #[test]
    fn test_resolve_is_stable_between_rebuilds() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        registry.rebuild(vec![unit("A", &["/p/x.cs"])]).unwrap();

        let first = registry.resolve(Path::new("/p/x.cs")).unwrap();
        let second = registry.resolve(Path::new("/p/x.cs")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_rebuild_replaces_previous_mapping() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        registry.rebuild(vec![unit("A", &["/p/x.cs"])]).unwrap();
        registry.rebuild(vec![unit("B", &["/p/y.cs"])]).unwrap();

        assert!(registry.resolve(Path::new("/p/x.cs")).is_none());
        assert!(registry.unit("A").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_ownership_rejected() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        let err = registry
            .rebuild(vec![
                unit("A", &["/p/shared.cs"]),
                unit("B", &["/p/shared.cs"]),
            ])
            .unwrap_err();

        match err {
            RegistryError::DuplicateOwnership {
                path,
                owner,
                claimant,
            } => {
                assert_eq!(path, PathBuf::from("/p/shared.cs"));
                assert_eq!(owner, "A");
                assert_eq!(claimant, "B");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Failed rebuild leaves nothing behind
        assert!(registry.is_empty());
        assert_eq!(registry.file_count(), 0);
    }

    #[test]
    fn test_first_wins_policy() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::FirstWins);
        let stats = registry
            .rebuild(vec![
                unit("A", &["/p/shared.cs"]),
                unit("B", &["/p/shared.cs", "/p/b.cs"]),
            ])
            .unwrap();

        assert_eq!(stats.conflicts, 1);
        assert_eq!(
            registry.resolve(Path::new("/p/shared.cs")).unwrap().name(),
            "A"
        );
        assert_eq!(registry.resolve(Path::new("/p/b.cs")).unwrap().name(), "B");
    }

    #[test]
    fn test_last_wins_policy() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::LastWins);
        registry
            .rebuild(vec![
                unit("A", &["/p/shared.cs"]),
                unit("B", &["/p/shared.cs"]),
            ])
            .unwrap();

        assert_eq!(
            registry.resolve(Path::new("/p/shared.cs")).unwrap().name(),
            "B"
        );
    }

    #[test]
    fn test_duplicate_unit_name_rejected() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::LastWins);
        let err = registry
            .rebuild(vec![unit("A", &["/p/a.cs"]), unit("A", &["/p/b.cs"])])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateUnit { name } if name == "A"));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        let a = BuildUnit::builder("A")
            .source("/p/a.cs")
            .output("/out/same.dll")
            .build()
            .unwrap();
        let b = BuildUnit::builder("B")
            .source("/p/b.cs")
            .output("/out/same.dll")
            .build()
            .unwrap();

        let err = registry.rebuild(vec![a, b]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOutput { .. }));
    }

    #[test]
    fn test_duplicate_output_detected_after_normalization() {
        let mut registry = UnitRegistry::new(OwnershipPolicy::Reject);
        let a = BuildUnit::builder("A")
            .source("/p/a.cs")
            .output("/out/same.dll")
            .build()
            .unwrap();
        let b = BuildUnit::builder("B")
            .source("/p/b.cs")
            .output("/out/tmp/../same.dll")
            .build()
            .unwrap();

        let err = registry.rebuild(vec![a, b]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOutput { path, .. } if path == Path::new("/out/same.dll")));
    }
}
