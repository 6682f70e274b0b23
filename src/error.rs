//! Error types shared by the registry, sinks and rotation policy.
//!
//! Every fallible public operation returns [`SinkError`]. Configuration
//! parsing has its own [`ConfigError`] which converts into
//! [`SinkError::InvalidConfig`] when a registry is built from a config.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::registry::SinkHandle;

/// Errors reported by sink registration, writes and shutdown.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination could not be opened or duplicated.
    #[error("failed to open {target}: {source}")]
    OpenFailed {
        target: String,
        #[source]
        source: io::Error,
    },
    /// The handle was never allocated by this registry.
    #[error("invalid sink handle {0}")]
    InvalidHandle(SinkHandle),
    /// The handle referred to a sink which has since been closed.
    #[error("sink {0} is already closed")]
    AlreadyClosed(SinkHandle),
    /// The descriptor write failed after exhausting transient retries.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
    /// The next numbered file could not be created during rollover.
    ///
    /// The record was still appended to the previous file and the sink keeps
    /// writing there until a later rollover succeeds.
    #[error("rotation to {path:?} failed: {source}")]
    RotationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Invalid user supplied configuration.
    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),
    /// An asynchronous writer panicked before `close` could join it.
    #[error("{0} asynchronous writer(s) panicked")]
    WorkerPanicked(usize),
}

impl SinkError {
    pub(crate) fn open_failed(target: impl Into<String>, source: io::Error) -> Self {
        Self::OpenFailed {
            target: target.into(),
            source,
        }
    }
}

/// Errors raised while parsing a [`RegistryConfig`](crate::RegistryConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("section [{section}] is missing required key `{key}`")]
    MissingKey { section: String, key: &'static str },
    #[error("section [{section}] has unknown sink kind `{kind}`")]
    UnknownKind { section: String, kind: String },
    #[error("section [{section}] key `{key}` is not a valid number: {value}")]
    InvalidNumber {
        section: String,
        key: &'static str,
        value: String,
    },
}

impl From<ConfigError> for SinkError {
    fn from(err: ConfigError) -> Self {
        SinkError::InvalidConfig(err.to_string())
    }
}
