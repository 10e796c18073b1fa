//! Error types for session lifecycle operations.

use thiserror::Error;

use crate::unit::{RegistryError, UnitError};
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to load build units: {0}")]
    Units(#[from] UnitError),

    #[error("Invalid unit layout: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to start watcher: {0}")]
    Watch(#[from] WatchError),
}
