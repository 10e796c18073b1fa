//! Error types for build units and the unit registry.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while describing or loading build units.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("Build unit '{name}' has no source files")]
    EmptyUnit { name: String },

    #[error("Build unit '{name}' lists relative source {path}; sources must be absolute")]
    RelativeSource { name: String, path: PathBuf },

    #[error("Failed to read unit manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid unit manifest {path}: {reason}")]
    ManifestParse { path: PathBuf, reason: String },

    #[error("Invalid source pattern '{pattern}' in unit '{unit}': {reason}")]
    InvalidPattern {
        unit: String,
        pattern: String,
        reason: String,
    },
}

/// Errors raised while rebuilding the registry.
///
/// All of these indicate misconfiguration and are the only failures in the
/// engine that are allowed to fail fast.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Source file {path} is claimed by both '{owner}' and '{claimant}'")]
    DuplicateOwnership {
        path: PathBuf,
        owner: String,
        claimant: String,
    },

    #[error("Build unit name '{name}' is declared more than once")]
    DuplicateUnit { name: String },

    #[error("Output {path} is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },
}
