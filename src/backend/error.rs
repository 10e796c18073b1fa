//! Error types for compile backends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No compiler command configured (set build.command.program)")]
    NoCommand,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No tokio runtime available: {reason}")]
    NoRuntime { reason: String },
}
