//! In-memory package store.
//!
//! Suitable for tests and embedding. Repositories and packages enumerate in
//! insertion order.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use shipyard_core::{Labels, Locator};

use crate::error::{Result, StoreError};
use crate::types::{CreateOptions, PackageEnvelope};
use crate::PackageService;

struct Entry {
    envelope: PackageEnvelope,
    data: Arc<[u8]>,
}

#[derive(Default)]
struct Inner {
    repositories: Vec<String>,
    packages: HashMap<String, Vec<Entry>>,
}

impl Inner {
    fn entry_mut(&mut self, loc: &Locator) -> Result<&mut Entry> {
        self.packages
            .get_mut(&loc.repository)
            .and_then(|entries| entries.iter_mut().find(|e| e.envelope.locator == *loc))
            .ok_or_else(|| StoreError::PackageNotFound(loc.clone()))
    }

    fn entry(&self, loc: &Locator) -> Result<&Entry> {
        self.packages
            .get(&loc.repository)
            .and_then(|entries| entries.iter().find(|e| e.envelope.locator == *loc))
            .ok_or_else(|| StoreError::PackageNotFound(loc.clone()))
    }
}

/// In-memory [`PackageService`].
#[derive(Default)]
pub struct MemoryPackageStore {
    inner: RwLock<Inner>,
}

impl MemoryPackageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty repository. Idempotent.
    pub fn create_repository(&self, repository: &str) {
        let mut inner = self.inner.write();
        if !inner.packages.contains_key(repository) {
            inner.repositories.push(repository.to_string());
            inner.packages.insert(repository.to_string(), Vec::new());
        }
    }

    /// Number of stored packages across all repositories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().packages.values().map(Vec::len).sum()
    }

    /// Returns true if no package is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PackageService for MemoryPackageStore {
    fn get_repositories(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().repositories.clone())
    }

    fn get_packages(&self, repository: &str) -> Result<Vec<PackageEnvelope>> {
        self.inner
            .read()
            .packages
            .get(repository)
            .map(|entries| entries.iter().map(|e| e.envelope.clone()).collect())
            .ok_or_else(|| StoreError::RepositoryNotFound(repository.to_string()))
    }

    fn read_package_envelope(&self, loc: &Locator) -> Result<PackageEnvelope> {
        Ok(self.inner.read().entry(loc)?.envelope.clone())
    }

    fn read_package(&self, loc: &Locator) -> Result<(PackageEnvelope, Box<dyn Read + Send>)> {
        let inner = self.inner.read();
        let entry = inner.entry(loc)?;
        let reader: Box<dyn Read + Send> = Box::new(Cursor::new(Arc::clone(&entry.data)));
        Ok((entry.envelope.clone(), reader))
    }

    fn create_package(
        &self,
        loc: &Locator,
        data: &mut dyn Read,
        options: CreateOptions,
    ) -> Result<PackageEnvelope> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;

        let envelope = PackageEnvelope {
            locator: loc.clone(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
            size_bytes: bytes.len() as u64,
            labels: options.labels,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.write();
        if inner.entry(loc).is_ok() {
            return Err(StoreError::AlreadyExists(loc.clone()));
        }
        if !inner.packages.contains_key(&loc.repository) {
            inner.repositories.push(loc.repository.clone());
        }
        inner
            .packages
            .entry(loc.repository.clone())
            .or_default()
            .push(Entry {
                envelope: envelope.clone(),
                data: bytes.into(),
            });

        tracing::debug!(package = %loc, digest = %envelope.digest, "Created package in memory");

        Ok(envelope)
    }

    fn update_package_labels(&self, loc: &Locator, add: &Labels, remove: &[String]) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner.entry_mut(loc)?;
        for key in remove {
            entry.envelope.labels.remove(key);
        }
        entry
            .envelope
            .labels
            .extend(add.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::labels;

    fn loc(s: &str) -> Locator {
        s.parse().unwrap()
    }

    #[test]
    fn package_crud() {
        let store = MemoryPackageStore::new();
        let web = loc("repo/web:1.0.0");

        let created = store
            .create_package(&web, &mut &b"archive"[..], CreateOptions::default())
            .unwrap();
        assert_eq!(created.size_bytes, 7);
        assert_eq!(store.len(), 1);

        let (envelope, mut reader) = store.read_package(&web).unwrap();
        let mut data = String::new();
        reader.read_to_string(&mut data).unwrap();
        assert_eq!(envelope.digest, created.digest);
        assert_eq!(data, "archive");
    }

    #[test]
    fn packages_are_immutable() {
        let store = MemoryPackageStore::new();
        let web = loc("repo/web:1.0.0");
        store
            .create_package(&web, &mut &b"one"[..], CreateOptions::default())
            .unwrap();

        let result = store.create_package(&web, &mut &b"two"[..], CreateOptions::default());
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn label_updates() {
        let store = MemoryPackageStore::new();
        let web = loc("repo/web:1.0.0");
        store
            .create_package(
                &web,
                &mut &b"x"[..],
                CreateOptions::with_labels(labels::installed()),
            )
            .unwrap();

        store
            .update_package_labels(
                &web,
                &Labels::from([("purpose".to_string(), "app".to_string())]),
                &[labels::INSTALLED.to_string()],
            )
            .unwrap();

        let envelope = store.read_package_envelope(&web).unwrap();
        assert!(!envelope.is_installed());
        assert!(envelope.has_label("purpose", "app"));
    }

    #[test]
    fn missing_lookups() {
        let store = MemoryPackageStore::new();
        store.create_repository("repo");

        assert!(store.get_packages("repo").unwrap().is_empty());
        assert!(store.get_packages("other").unwrap_err().is_not_found());
        assert!(store
            .read_package_envelope(&loc("repo/web:1.0.0"))
            .unwrap_err()
            .is_not_found());
    }
}
