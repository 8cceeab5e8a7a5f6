//! Error types for package resolution and configuration.

use shipyard_core::LocatorError;
use shipyard_store::StoreError;
use thiserror::Error;

/// A result type using `PackError`.
pub type Result<T> = std::result::Result<T, PackError>;

/// Errors that can occur while resolving, configuring or running packages.
#[derive(Debug, Error)]
pub enum PackError {
    /// No matching package or command. An expected answer for many searches.
    #[error("{0}")]
    NotFound(String),

    /// The request is not acceptable (application mismatch, downgrade, ...).
    #[error("{0}")]
    InvalidArgument(String),

    /// The package manifest lacks something the operation requires.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Configuration arguments do not match the manifest's parameter schema.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Archive, filesystem or process I/O failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// A package command ran and exited unsuccessfully.
    #[error("command {command:?} failed: {status}")]
    CommandFailed {
        /// The command line that ran.
        command: String,
        /// Exit status description.
        status: String,
        /// Combined output captured before the failure.
        output: Vec<u8>,
    },

    /// Storage layer error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Locator parsing error.
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

impl PackError {
    /// Wrap an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if nothing matched, including missing store records.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Captured command output, if the error carries any.
    #[must_use]
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
