//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Known repositories, keyed by repository name.
    pub const REPOSITORIES: &str = "repositories";

    /// Package envelopes, keyed by `repository \0 name \0 version`.
    pub const PACKAGES: &str = "packages";

    /// Archive bytes, keyed by their blake3 digest.
    pub const BLOBS: &str = "blobs";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::REPOSITORIES, cf::PACKAGES, cf::BLOBS]
}
