//! Error types for the kshelf core.
//!
//! Every fallible collaborator call in the core returns [`ShelfError`]. The
//! variants follow the failure taxonomy the manager reacts to: network
//! failures keep the previously known state, storage failures revert a
//! download, record failures are reported and otherwise ignored.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the core.
pub type ShelfResult<T> = Result<T, ShelfError>;

/// Consolidated error type for kshelf core operations.
#[derive(Debug, Error)]
pub enum ShelfError {
    /// Registry fetch or artifact download failed.
    #[error("network error: {message}")]
    Network {
        /// Description of the failed request.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reading, writing or deleting local data failed.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be serialized.
    #[error("record error: {message}")]
    Record {
        /// Description of the record operation.
        message: String,
    },

    /// Configuration could not be resolved.
    #[error("config error at {path}: {message}")]
    Config {
        /// The configuration file involved.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

impl ShelfError {
    /// Creates a new `Network` error without a source.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Network` error wrapping a source error.
    #[must_use]
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `Record` error.
    #[must_use]
    pub fn record(message: impl Into<String>) -> Self {
        Self::Record {
            message: message.into(),
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for failures caused by the network.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
