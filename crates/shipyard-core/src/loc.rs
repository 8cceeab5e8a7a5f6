//! Package locators.
//!
//! A [`Locator`] names one version of one package: `repository/name:version`.
//! The `(repository, name)` pair identifies an application line; the version
//! orders packages within that line by semantic-version precedence.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};
use crate::labels::LATEST;

/// Placeholder version of a line's zero-version locator.
///
/// Zero-version locators are used purely as label values and never resolve to
/// a stored artifact.
pub const ZERO_VERSION: &str = "0.0.0";

/// Identity of one package version.
///
/// Locators are plain values. [`Locator::new`] and [`FromStr`] validate the
/// version; locators read back from storage are accepted as written so that
/// malformed historical artifacts can still be enumerated (and skipped).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    /// Repository the package lives in.
    pub repository: String,
    /// Package name within the repository.
    pub name: String,
    /// Semantic version, or the `latest` sentinel.
    pub version: String,
}

impl Locator {
    /// Create a locator, validating the version.
    ///
    /// # Errors
    ///
    /// Returns `LocatorError::MalformedVersion` if the version is neither a
    /// semantic version nor the `latest` sentinel, and
    /// `LocatorError::MalformedLocator` if repository or name is empty.
    pub fn new(
        repository: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let loc = Self {
            repository: repository.into(),
            name: name.into(),
            version: version.into(),
        };
        if loc.repository.is_empty() || loc.name.is_empty() {
            return Err(LocatorError::MalformedLocator(loc.to_string()));
        }
        if loc.version != LATEST {
            loc.semver()?;
        }
        Ok(loc)
    }

    /// Parse the version as a semantic version.
    ///
    /// # Errors
    ///
    /// Returns `LocatorError::MalformedVersion` if the version does not parse.
    pub fn semver(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.version).map_err(|e| LocatorError::MalformedVersion {
            version: self.version.clone(),
            reason: e.to_string(),
        })
    }

    /// Returns true if this locator asks for the latest version of its line,
    /// either as the bare `latest` version or as `latest` build metadata.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        if self.version == LATEST {
            return true;
        }
        self.semver()
            .map(|v| v.build.as_str() == LATEST)
            .unwrap_or(false)
    }

    /// The same line with the placeholder [`ZERO_VERSION`].
    #[must_use]
    pub fn zero_version(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            name: self.name.clone(),
            version: ZERO_VERSION.to_string(),
        }
    }

    /// Returns true if both locators belong to the same application line.
    #[must_use]
    pub fn same_line(&self, other: &Self) -> bool {
        self.repository == other.repository && self.name == other.name
    }

    /// Compare versions by semantic-version precedence.
    ///
    /// Build metadata does not take part in precedence; a `latest` locator has
    /// no precedence at all and must be resolved first.
    ///
    /// # Errors
    ///
    /// Returns an error if either version is malformed or the `latest` sentinel.
    pub fn cmp_version(&self, other: &Self) -> Result<Ordering> {
        let ours = self.concrete_semver()?;
        let theirs = other.concrete_semver()?;
        Ok(ours.cmp_precedence(&theirs))
    }

    fn concrete_semver(&self) -> Result<semver::Version> {
        if self.is_latest() {
            return Err(LocatorError::Unresolved(self.version.clone()));
        }
        self.semver()
    }

    fn split(s: &str) -> Result<(&str, &str, &str)> {
        let malformed = || LocatorError::MalformedLocator(s.to_string());
        let (head, version) = s.rsplit_once(':').ok_or_else(malformed)?;
        let (repository, name) = head.split_once('/').ok_or_else(malformed)?;
        if repository.is_empty() || name.is_empty() || version.is_empty() || name.contains('/') {
            return Err(malformed());
        }
        Ok((repository, name, version))
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({self})")
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.repository, self.name, self.version)
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self> {
        let (repository, name, version) = Self::split(s)?;
        Self::new(repository, name, version)
    }
}

impl TryFrom<String> for Locator {
    type Error = LocatorError;

    /// Structural parse only; see the type-level docs.
    fn try_from(value: String) -> Result<Self> {
        let (repository, name, version) = Self::split(&value)?;
        Ok(Self {
            repository: repository.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl From<Locator> for String {
    fn from(loc: Locator) -> Self {
        loc.to_string()
    }
}
