//! Error types for the storage layer.

use shipyard_core::{Locator, LocatorError};
use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested package does not exist.
    #[error("package {0} not found")]
    PackageNotFound(Locator),

    /// The requested repository does not exist.
    #[error("repository {0:?} not found")]
    RepositoryNotFound(String),

    /// Packages are immutable; a locator can only be created once.
    #[error("package {0} already exists")]
    AlreadyExists(Locator),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Reading package data failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored locator could not be parsed.
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

impl StoreError {
    /// Returns true if the error reports a missing package or repository.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PackageNotFound(_) | Self::RepositoryNotFound(_))
    }
}
