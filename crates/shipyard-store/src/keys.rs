//! Key encoding utilities for `RocksDB`.
//!
//! Package keys are `repository \0 name \0 version` so that a prefix scan over
//! `repository \0` enumerates exactly one repository.

use shipyard_core::Locator;

const SEPARATOR: u8 = 0;

/// Encode a repository key.
#[must_use]
pub fn repository_key(repository: &str) -> Vec<u8> {
    repository.as_bytes().to_vec()
}

/// Encode the scan prefix for all packages of a repository.
#[must_use]
pub fn repository_prefix(repository: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(repository.len() + 1);
    key.extend_from_slice(repository.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Encode a package key.
#[must_use]
pub fn package_key(loc: &Locator) -> Vec<u8> {
    let mut key = repository_prefix(&loc.repository);
    key.extend_from_slice(loc.name.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(loc.version.as_bytes());
    key
}

/// Encode a blob key from a hex digest.
#[must_use]
pub fn blob_key(digest: &str) -> Vec<u8> {
    digest.as_bytes().to_vec()
}
