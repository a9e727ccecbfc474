// src/errors.rs

//! Crate-wide error type.
//!
//! Errors fall in two groups. Recoverable errors (bad request documents,
//! illegal transitions, undispatchable tasks) are reported to the caller
//! and leave all state untouched. Fatal errors (accounting violations,
//! corrupt durable state, failed journal writes) mean an invariant is
//! already broken; they travel up to the runtime, which stops the manager.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Illegal transition for {object}: {from} -> {to}")]
    IllegalTransition {
        object: String,
        from: String,
        to: String,
    },

    #[error("Task {task} cannot be dispatched: input '{file}' is not immutable")]
    InputsNotReady { task: u64, file: String },

    #[error("Accounting error: {0}")]
    Accounting(String),

    #[error("Corrupt record at {path:?}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Journal write failed at {path:?}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwarmError {
    /// Whether this error must stop the manager.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwarmError::Accounting(_) | SwarmError::CorruptRecord { .. } | SwarmError::Journal { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SwarmError>;
