//! Archive handling: decompression, tarball creation and unpacking.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use shipyard_core::Locator;
use shipyard_store::PackageService;

use crate::error::{PackError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wrap `reader` with a gzip decoder if the stream is gzip-compressed.
///
/// Plain tar streams are passed through.
///
/// # Errors
///
/// Returns an error if the stream cannot be read.
pub fn decompress<'a>(reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
    let mut buffered = BufReader::new(reader);
    let head = buffered
        .fill_buf()
        .map_err(|e| PackError::io("failed to read archive", e))?;
    if head.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Build a gzip-compressed tarball holding `files` (path, contents).
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn write_archive(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *contents)
            .map_err(|e| PackError::io(format!("failed to add {path} to archive"), e))?;
    }

    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| PackError::io("failed to finish archive", e))
}

/// Returns true if an archive entry path names `file` at the archive root.
pub(crate) fn is_root_entry(path: &Path, file: &str) -> bool {
    path.strip_prefix(".").unwrap_or(path) == Path::new(file)
}

/// Directory a package unpacks to: `base/repository/name/version`.
///
/// # Errors
///
/// Returns `PackError::InvalidArgument` if any locator part is not a single
/// plain path component, so the result always stays below `base`.
pub fn package_path(base: &Path, loc: &Locator) -> Result<PathBuf> {
    let mut path = base.to_path_buf();
    for part in [&loc.repository, &loc.name, &loc.version] {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(c)), None) if c == part.as_str() => path.push(c),
            _ => {
                return Err(PackError::InvalidArgument(format!(
                    "{loc}: {part:?} is not a valid path component"
                )))
            }
        }
    }
    Ok(path)
}

/// Returns true if `target` already holds an unpacked package.
///
/// # Errors
///
/// Returns an error if `target` exists but is not a directory.
pub fn is_unpacked(target: &Path) -> Result<bool> {
    match fs::metadata(target) {
        Ok(meta) if meta.is_dir() => Ok(true),
        Ok(_) => Err(PackError::InvalidArgument(format!(
            "expected {} to be a directory",
            target.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PackError::io(format!("failed to stat {}", target.display()), e)),
    }
}

/// Read `loc` from the store and unpack it into `target`.
///
/// Unpacking over an existing directory overwrites files in place. If a fresh
/// unpack fails, the partially written directory is removed so that
/// [`is_unpacked`] does not report it.
///
/// # Errors
///
/// Returns an error if the package cannot be read or extracted.
pub fn unpack<S: PackageService + ?Sized>(service: &S, loc: &Locator, target: &Path) -> Result<()> {
    let fresh = !is_unpacked(target)?;
    fs::create_dir_all(target)
        .map_err(|e| PackError::io(format!("failed to create {}", target.display()), e))?;

    let result = extract(service, loc, target);
    if result.is_err() && fresh {
        if let Err(e) = fs::remove_dir_all(target) {
            tracing::warn!(target = %target.display(), error = %e, "Failed to clean up partial unpack");
        }
    }
    result
}

fn extract<S: PackageService + ?Sized>(service: &S, loc: &Locator, target: &Path) -> Result<()> {
    let (_, reader) = service.read_package(loc)?;
    let mut archive = tar::Archive::new(decompress(reader)?);
    archive
        .unpack(target)
        .map_err(|e| PackError::io(format!("failed to unpack {loc} into {}", target.display()), e))?;

    tracing::info!(package = %loc, target = %target.display(), "Unpacked package");
    Ok(())
}

/// Unpack `loc` into `target` unless it is already unpacked there.
///
/// # Errors
///
/// Returns an error if the check or the unpack fails.
pub fn unpack_if_not_unpacked<S: PackageService + ?Sized>(
    service: &S,
    loc: &Locator,
    target: &Path,
) -> Result<()> {
    if is_unpacked(target)? {
        tracing::debug!(package = %loc, target = %target.display(), "Package already unpacked");
        return Ok(());
    }
    unpack(service, loc, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shipyard_core::Labels;
    use shipyard_store::{CreateOptions, MemoryPackageStore, PackageEnvelope, StoreError};
    use tempfile::TempDir;

    /// Counts archive reads on top of a memory store.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPackageStore,
        reads: AtomicUsize,
    }

    impl PackageService for CountingStore {
        fn get_repositories(&self) -> shipyard_store::Result<Vec<String>> {
            self.inner.get_repositories()
        }

        fn get_packages(&self, repository: &str) -> shipyard_store::Result<Vec<PackageEnvelope>> {
            self.inner.get_packages(repository)
        }

        fn read_package_envelope(&self, loc: &Locator) -> shipyard_store::Result<PackageEnvelope> {
            self.inner.read_package_envelope(loc)
        }

        fn read_package(
            &self,
            loc: &Locator,
        ) -> shipyard_store::Result<(PackageEnvelope, Box<dyn Read + Send>)> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_package(loc)
        }

        fn create_package(
            &self,
            loc: &Locator,
            data: &mut dyn Read,
            options: CreateOptions,
        ) -> shipyard_store::Result<PackageEnvelope> {
            self.inner.create_package(loc, data, options)
        }

        fn update_package_labels(
            &self,
            loc: &Locator,
            add: &Labels,
            remove: &[String],
        ) -> std::result::Result<(), StoreError> {
            self.inner.update_package_labels(loc, add, remove)
        }
    }

    fn store_with_archive(loc: &Locator, data: &[u8]) -> CountingStore {
        let store = CountingStore::default();
        store
            .create_package(loc, &mut &data[..], CreateOptions::default())
            .unwrap();
        store
    }

    #[test]
    fn decompress_detects_gzip_and_plain() {
        let gz = write_archive(&[("a.txt", &b"hello"[..])]).unwrap();
        let mut archive = tar::Archive::new(decompress(&gz[..]).unwrap());
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");

        let plain = b"not compressed";
        let mut out = Vec::new();
        decompress(&plain[..]).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn root_entry_matching() {
        assert!(is_root_entry(Path::new("manifest.json"), "manifest.json"));
        assert!(is_root_entry(Path::new("./manifest.json"), "manifest.json"));
        assert!(!is_root_entry(Path::new("resources/manifest.json"), "manifest.json"));
    }

    #[test]
    fn package_path_layout() {
        let loc: Locator = "repo/web:1.0.0".parse().unwrap();
        assert_eq!(
            package_path(Path::new("/var/lib/pkgs"), &loc).unwrap(),
            PathBuf::from("/var/lib/pkgs/repo/web/1.0.0")
        );
    }

    #[test]
    fn package_path_stays_below_base() {
        let base = Path::new("/var/lib/pkgs");
        for (repository, name) in [
            ("..", "web"),
            ("repo", ".."),
            ("repo", "a/b"),
            ("", "web"),
            ("repo", "."),
        ] {
            let loc = Locator {
                repository: repository.to_string(),
                name: name.to_string(),
                version: "1.0.0".to_string(),
            };
            assert!(
                matches!(package_path(base, &loc), Err(PackError::InvalidArgument(_))),
                "{loc:?} accepted"
            );
        }
    }

    #[test]
    fn unpack_if_not_unpacked_extracts_once() {
        let loc: Locator = "repo/web:1.0.0".parse().unwrap();
        let store = store_with_archive(&loc, &write_archive(&[("bin/run", &b"#!/bin/sh"[..])]).unwrap());
        let dir = TempDir::new().unwrap();
        let target = package_path(dir.path(), &loc).unwrap();

        unpack_if_not_unpacked(&store, &loc, &target).unwrap();
        unpack_if_not_unpacked(&store, &loc, &target).unwrap();

        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(target.join("bin/run")).unwrap(), b"#!/bin/sh");
    }

    #[test]
    fn failed_fresh_unpack_leaves_nothing_behind() {
        let loc: Locator = "repo/web:1.0.0".parse().unwrap();
        let store = store_with_archive(&loc, &[0x1f, 0x8b, 0, 1, 2, 3]);
        let dir = TempDir::new().unwrap();
        let target = package_path(dir.path(), &loc).unwrap();

        assert!(unpack(&store, &loc, &target).is_err());
        assert!(!is_unpacked(&target).unwrap());
    }

    #[test]
    fn is_unpacked_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(is_unpacked(&file), Err(PackError::InvalidArgument(_))));
        assert!(!is_unpacked(&dir.path().join("missing")).unwrap());
    }
}
