//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksPackageStore` implementation of the
//! `PackageService` trait. Archive bytes are content-addressed: two packages
//! with identical archives share one blob.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use shipyard_core::{Labels, Locator};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{CreateOptions, PackageEnvelope};
use crate::PackageService;

/// RocksDB-backed package store.
pub struct RocksPackageStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksPackageStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Register an empty repository. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_repository(&self, repository: &str) -> Result<()> {
        let cf = self.cf(cf::REPOSITORIES)?;
        self.db
            .put_cf(&cf, keys::repository_key(repository), [])
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_envelope(&self, loc: &Locator) -> Result<Option<PackageEnvelope>> {
        let cf = self.cf(cf::PACKAGES)?;

        self.db
            .get_cf(&cf, keys::package_key(loc))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn repository_exists(&self, repository: &str) -> Result<bool> {
        let cf = self.cf(cf::REPOSITORIES)?;

        Ok(self
            .db
            .get_cf(&cf, keys::repository_key(repository))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }
}

impl PackageService for RocksPackageStore {
    fn get_repositories(&self) -> Result<Vec<String>> {
        let cf = self.cf(cf::REPOSITORIES)?;

        let mut repositories = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let name = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            repositories.push(name);
        }

        Ok(repositories)
    }

    fn get_packages(&self, repository: &str) -> Result<Vec<PackageEnvelope>> {
        if !self.repository_exists(repository)? {
            return Err(StoreError::RepositoryNotFound(repository.to_string()));
        }

        let cf = self.cf(cf::PACKAGES)?;
        let prefix = keys::repository_prefix(repository);

        let mut packages = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(&prefix) {
                break;
            }

            packages.push(Self::deserialize(&value)?);
        }

        Ok(packages)
    }

    fn read_package_envelope(&self, loc: &Locator) -> Result<PackageEnvelope> {
        self.get_envelope(loc)?
            .ok_or_else(|| StoreError::PackageNotFound(loc.clone()))
    }

    fn read_package(&self, loc: &Locator) -> Result<(PackageEnvelope, Box<dyn Read + Send>)> {
        let envelope = self.read_package_envelope(loc)?;
        let cf = self.cf(cf::BLOBS)?;

        let data = self
            .db
            .get_cf(&cf, keys::blob_key(&envelope.digest))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| {
                StoreError::Database(format!("blob {} of {loc} is missing", envelope.digest))
            })?;

        Ok((envelope, Box::new(Cursor::new(data))))
    }

    fn create_package(
        &self,
        loc: &Locator,
        data: &mut dyn Read,
        options: CreateOptions,
    ) -> Result<PackageEnvelope> {
        if self.get_envelope(loc)?.is_some() {
            return Err(StoreError::AlreadyExists(loc.clone()));
        }

        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;

        let envelope = PackageEnvelope {
            locator: loc.clone(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
            size_bytes: bytes.len() as u64,
            labels: options.labels,
            created_at: Utc::now(),
        };

        let cf_repositories = self.cf(cf::REPOSITORIES)?;
        let cf_packages = self.cf(cf::PACKAGES)?;
        let cf_blobs = self.cf(cf::BLOBS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_repositories, keys::repository_key(&loc.repository), []);
        batch.put_cf(&cf_packages, keys::package_key(loc), Self::serialize(&envelope)?);
        // Identical archives share one blob
        batch.put_cf(&cf_blobs, keys::blob_key(&envelope.digest), &bytes);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(
            package = %loc,
            digest = %envelope.digest,
            size_bytes = envelope.size_bytes,
            "Created package"
        );

        Ok(envelope)
    }

    fn update_package_labels(&self, loc: &Locator, add: &Labels, remove: &[String]) -> Result<()> {
        let mut envelope = self.read_package_envelope(loc)?;
        for key in remove {
            envelope.labels.remove(key);
        }
        envelope
            .labels
            .extend(add.iter().map(|(k, v)| (k.clone(), v.clone())));

        let cf = self.cf(cf::PACKAGES)?;
        self.db
            .put_cf(&cf, keys::package_key(loc), Self::serialize(&envelope)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(package = %loc, labels = ?envelope.labels, "Updated package labels");

        Ok(())
    }
}
