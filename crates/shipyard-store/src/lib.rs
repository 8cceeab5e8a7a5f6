//! Package storage layer for shipyard.
//!
//! This crate defines the [`PackageService`] capability the rest of shipyard
//! consumes, together with two implementations:
//!
//! - [`RocksPackageStore`]: content-addressed `RocksDB` storage
//! - [`MemoryPackageStore`]: in-process storage for tests and embedding
//!
//! # Architecture
//!
//! The `RocksDB` store uses the following column families:
//!
//! - `repositories`: known repository names
//! - `packages`: envelopes, keyed by `repository \0 name \0 version`
//! - `blobs`: archive bytes, keyed by blake3 digest
//!
//! Packages are immutable once created. Only their labels change.
//!
//! # Example
//!
//! ```no_run
//! use shipyard_store::{PackageIter, PackageService, RocksPackageStore};
//!
//! let store = RocksPackageStore::open("/tmp/shipyard-db").unwrap();
//! for envelope in PackageIter::new(&store, Some("example.com")) {
//!     println!("{}", envelope.unwrap().locator);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

use std::io::Read;

pub use error::{Result, StoreError};
pub use memory::MemoryPackageStore;
pub use rocks::RocksPackageStore;
pub use types::{CreateOptions, PackageEnvelope, PackageUpdate};

use shipyard_core::{Labels, Locator};

/// The package storage capability.
///
/// Reads never block other reads. Writes target a single new locator and
/// never rewrite archive bytes, which is what makes lock-free resolution on
/// top of this trait safe.
pub trait PackageService: Send + Sync {
    /// List repository names in store-defined order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_repositories(&self) -> Result<Vec<String>>;

    /// List the envelopes of one repository in store-defined order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RepositoryNotFound` if the repository is unknown.
    fn get_packages(&self, repository: &str) -> Result<Vec<PackageEnvelope>>;

    /// Get the envelope of one package.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PackageNotFound` if the package doesn't exist.
    fn read_package_envelope(&self, loc: &Locator) -> Result<PackageEnvelope>;

    /// Open a package's archive.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PackageNotFound` if the package doesn't exist.
    fn read_package(&self, loc: &Locator) -> Result<(PackageEnvelope, Box<dyn Read + Send>)>;

    /// Create a new package from `data`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the locator is taken.
    fn create_package(
        &self,
        loc: &Locator,
        data: &mut dyn Read,
        options: CreateOptions,
    ) -> Result<PackageEnvelope>;

    /// Add and remove labels on an existing package.
    ///
    /// Removal is applied before addition.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PackageNotFound` if the package doesn't exist.
    fn update_package_labels(&self, loc: &Locator, add: &Labels, remove: &[String]) -> Result<()>;
}

/// Lazy iterator over package envelopes.
///
/// Repositories are listed on first use and each repository's packages are
/// fetched when the previous one is exhausted. Creating a new iterator
/// restarts the enumeration. The first error ends iteration.
pub struct PackageIter<'a, S: PackageService + ?Sized> {
    service: &'a S,
    scope: Option<String>,
    repositories: Option<std::vec::IntoIter<String>>,
    current: std::vec::IntoIter<PackageEnvelope>,
    done: bool,
}

impl<'a, S: PackageService + ?Sized> PackageIter<'a, S> {
    /// Iterate one repository, or every repository if `repository` is `None`.
    #[must_use]
    pub fn new(service: &'a S, repository: Option<&str>) -> Self {
        Self {
            service,
            scope: repository.map(ToString::to_string),
            repositories: None,
            current: Vec::new().into_iter(),
            done: false,
        }
    }

    fn fail(&mut self, err: StoreError) -> Option<Result<PackageEnvelope>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<S: PackageService + ?Sized> Iterator for PackageIter<'_, S> {
    type Item = Result<PackageEnvelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(envelope) = self.current.next() {
                return Some(Ok(envelope));
            }
            if self.repositories.is_none() {
                let repositories = match &self.scope {
                    Some(repository) => vec![repository.clone()],
                    None => match self.service.get_repositories() {
                        Ok(repositories) => repositories,
                        Err(e) => return self.fail(e),
                    },
                };
                self.repositories = Some(repositories.into_iter());
            }
            let repository = self.repositories.as_mut()?.next()?;
            match self.service.get_packages(&repository) {
                Ok(packages) => self.current = packages.into_iter(),
                Err(e) => return self.fail(e),
            }
        }
    }
}
