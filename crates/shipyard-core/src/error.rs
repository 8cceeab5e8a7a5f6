//! Error types shared by every shipyard crate that handles locators.

use thiserror::Error;

/// A result type using `LocatorError`.
pub type Result<T> = std::result::Result<T, LocatorError>;

/// Errors raised while parsing or comparing package locators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// The textual form is not `repository/name:version`.
    #[error("malformed locator {0:?}, expected repository/name:version")]
    MalformedLocator(String),

    /// The version component is not a semantic version.
    #[error("malformed version {version:?}: {reason}")]
    MalformedVersion {
        /// The offending version string.
        version: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The `latest` sentinel was used where a concrete version is required.
    #[error("version {0:?} is the latest sentinel and has no precedence")]
    Unresolved(String),
}
