//! Package records exchanged with the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipyard_core::{labels, Labels, Locator};

/// A discovered package instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEnvelope {
    /// Identity of the package.
    pub locator: Locator,
    /// Hex blake3 digest of the archive, the content address its bytes and
    /// embedded manifest are read through.
    pub digest: String,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Labels set by the producer.
    #[serde(default)]
    pub labels: Labels,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PackageEnvelope {
    /// Returns true if the envelope carries `key` with exactly `value`.
    #[must_use]
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }

    /// Returns true if the envelope carries every pair in `labels`.
    #[must_use]
    pub fn has_labels(&self, labels: &Labels) -> bool {
        labels.iter().all(|(k, v)| self.has_label(k, v))
    }

    /// Returns true if this is the active package of its line.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.has_label(labels::INSTALLED, labels::INSTALLED)
    }
}

/// A proposed transition between two versions of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUpdate {
    /// Currently installed package.
    pub from: Locator,
    /// Package to upgrade to.
    pub to: Locator,
}

impl fmt::Display for PackageUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Options for package creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Labels to attach to the new package.
    pub labels: Labels,
}

impl CreateOptions {
    /// Create options attaching the given labels.
    #[must_use]
    pub fn with_labels(labels: Labels) -> Self {
        Self { labels }
    }
}
