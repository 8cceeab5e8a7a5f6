//! Package resolution.
//!
//! Read-only queries over a [`PackageService`]: find by predicate, find the
//! latest version of a line, find the installed or config package of a line,
//! and compute or validate an update. Scans take no locks of their own.

use std::cmp::Ordering;

use semver::Version;
use shipyard_core::{labels, Labels, Locator};
use shipyard_store::{PackageEnvelope, PackageIter, PackageService, PackageUpdate};

use crate::error::{PackError, Result};

/// Return the first envelope satisfying `predicate`, in store order.
///
/// # Errors
///
/// Returns `PackError::NotFound` if nothing matches, or the store error that
/// ended the scan.
pub fn find_package<S, F>(service: &S, mut predicate: F) -> Result<PackageEnvelope>
where
    S: PackageService + ?Sized,
    F: FnMut(&PackageEnvelope) -> bool,
{
    for envelope in PackageIter::new(service, None) {
        let envelope = envelope?;
        if predicate(&envelope) {
            return Ok(envelope);
        }
    }
    Err(PackError::NotFound("no package matches".to_string()))
}

/// Invoke `f` for every package in the store. The first error aborts.
///
/// # Errors
///
/// Returns the first error from the store or from `f`.
pub fn foreach_package<S, F>(service: &S, f: F) -> Result<()>
where
    S: PackageService + ?Sized,
    F: FnMut(&PackageEnvelope) -> Result<()>,
{
    foreach(PackageIter::new(service, None), f)
}

/// Invoke `f` for every package in `repository`. The first error aborts.
///
/// # Errors
///
/// Returns the first error from the store or from `f`.
pub fn foreach_package_in_repo<S, F>(service: &S, repository: &str, f: F) -> Result<()>
where
    S: PackageService + ?Sized,
    F: FnMut(&PackageEnvelope) -> Result<()>,
{
    foreach(PackageIter::new(service, Some(repository)), f)
}

fn foreach<S, F>(iter: PackageIter<'_, S>, mut f: F) -> Result<()>
where
    S: PackageService + ?Sized,
    F: FnMut(&PackageEnvelope) -> Result<()>,
{
    for envelope in iter {
        f(&envelope?)?;
    }
    Ok(())
}

/// Keep whichever of `current` and `candidate` has the higher version.
///
/// Only a strictly greater version replaces the running maximum, so among
/// equal-precedence versions the first one seen wins.
fn keep_latest(
    current: Option<(Version, PackageEnvelope)>,
    candidate: (Version, PackageEnvelope),
) -> Option<(Version, PackageEnvelope)> {
    match current {
        Some(max) if candidate.0.cmp_precedence(&max.0) != Ordering::Greater => Some(max),
        _ => Some(candidate),
    }
}

/// Find the highest-versioned envelope satisfying `predicate`.
///
/// Scans `repository`, or every repository if `None`. Envelopes whose version
/// does not parse are dropped before comparison, so they can neither fail the
/// scan nor become the maximum.
///
/// # Errors
///
/// Returns `PackError::NotFound` if nothing matches, or the store error that
/// ended the scan.
pub fn find_latest_package_predicate<S, F>(
    service: &S,
    repository: Option<&str>,
    mut predicate: F,
) -> Result<PackageEnvelope>
where
    S: PackageService + ?Sized,
    F: FnMut(&PackageEnvelope) -> bool,
{
    let mut latest = None;
    for envelope in PackageIter::new(service, repository) {
        let envelope = envelope?;
        if !predicate(&envelope) {
            continue;
        }
        match envelope.locator.semver() {
            Ok(version) => latest = keep_latest(latest, (version, envelope)),
            Err(e) => {
                tracing::debug!(package = %envelope.locator, error = %e, "Skipping package with malformed version");
            }
        }
    }

    latest
        .map(|(_, envelope)| envelope)
        .ok_or_else(|| PackError::NotFound("no package matches".to_string()))
}

/// Turn a not-found outcome into one with a descriptive message.
fn describe_not_found(err: PackError, message: impl FnOnce() -> String) -> PackError {
    if err.is_not_found() {
        PackError::NotFound(message())
    } else {
        err
    }
}

/// Find the latest package of `filter`'s line.
///
/// # Errors
///
/// Returns `PackError::NotFound` if the line has no parseable version.
pub fn find_latest_package<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
) -> Result<PackageEnvelope> {
    find_latest_package_predicate(service, Some(&filter.repository), |e| {
        e.locator.same_line(filter)
    })
    .map_err(|e| describe_not_found(e, || format!("latest package of {}/{} not found", filter.repository, filter.name)))
}

/// Find the latest package named `name` in any repository.
///
/// # Errors
///
/// Returns `PackError::NotFound` if no such package exists.
pub fn find_latest_package_by_name<S: PackageService + ?Sized>(
    service: &S,
    name: &str,
) -> Result<PackageEnvelope> {
    find_latest_package_predicate(service, None, |e| e.locator.name == name)
        .map_err(|e| describe_not_found(e, || format!("latest package with name {name:?} not found")))
}

/// Find the latest package carrying every label in `labels`.
///
/// # Errors
///
/// Returns `PackError::NotFound` if no such package exists.
pub fn find_latest_package_with_labels<S: PackageService + ?Sized>(
    service: &S,
    repository: Option<&str>,
    labels: &Labels,
) -> Result<PackageEnvelope> {
    find_latest_package_predicate(service, repository, |e| e.has_labels(labels))
        .map_err(|e| describe_not_found(e, || format!("latest package with labels {labels:?} not found")))
}

/// Find the package of `filter`'s line that carries the `installed` label.
///
/// # Errors
///
/// Returns `PackError::NotFound` if the line has no installed package.
pub fn find_installed_package<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
) -> Result<Locator> {
    find_package(service, |e| e.locator.same_line(filter) && e.is_installed())
        .map(|e| e.locator)
        .map_err(|e| describe_not_found(e, || format!("no installed package for {}/{}", filter.repository, filter.name)))
}

/// Find the line-wide configuration package owned by `filter`'s line.
///
/// Per-node config packages (those carrying a `node` label) never match.
///
/// # Errors
///
/// Returns `PackError::NotFound` if the line has no config package.
pub fn find_config_package<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
) -> Result<Locator> {
    let owner = filter.zero_version().to_string();
    find_package(service, |e| {
        e.has_label(labels::CONFIG, &owner) && !e.labels.contains_key(labels::NODE)
    })
    .map(|e| e.locator)
    .map_err(|e| describe_not_found(e, || format!("no configuration package for {owner}")))
}

/// Find the configuration package owned by `filter`'s line for `node`.
///
/// # Errors
///
/// Returns `PackError::NotFound` if the node has no config package of that line.
pub fn find_node_config_package<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
    node: &str,
) -> Result<Locator> {
    let owner = filter.zero_version().to_string();
    find_package(service, |e| {
        e.has_label(labels::CONFIG, &owner) && e.has_label(labels::NODE, node)
    })
    .map(|e| e.locator)
    .map_err(|e| describe_not_found(e, || format!("no configuration package for {owner} on {node}")))
}

/// Find the installed package of `filter`'s line and its config package.
///
/// # Errors
///
/// Returns `PackError::NotFound` if either lookup finds nothing.
pub fn find_installed_package_with_config<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
) -> Result<(Locator, Locator)> {
    let installed = find_installed_package(service, filter)?;
    let config = find_config_package(service, &installed)?;
    Ok((installed, config))
}

/// List every package of `filter`'s line with a strictly higher version.
///
/// Packages with malformed versions are skipped. The result is unordered.
///
/// # Errors
///
/// Returns an error if `filter`'s own version is malformed or the scan fails.
pub fn find_newer_packages<S: PackageService + ?Sized>(
    service: &S,
    filter: &Locator,
) -> Result<Vec<Locator>> {
    let current = filter.semver()?;
    let mut newer = Vec::new();
    foreach_package_in_repo(service, &filter.repository, |e| {
        if !e.locator.same_line(filter) {
            return Ok(());
        }
        match e.locator.semver() {
            Ok(version) if version.cmp_precedence(&current) == Ordering::Greater => {
                newer.push(e.locator.clone());
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(package = %e.locator, error = %err, "Skipping package with malformed version");
            }
        }
        Ok(())
    })?;
    Ok(newer)
}

/// Compute the update from `pkg` to the latest version of its line.
///
/// # Errors
///
/// Returns `PackError::NotFound` if `pkg` is already the latest version. This
/// is the normal "up to date" answer.
pub fn find_package_update<S: PackageService + ?Sized>(
    service: &S,
    pkg: &Locator,
) -> Result<PackageUpdate> {
    let latest = find_latest_package(service, pkg)?;
    if latest.locator.cmp_version(pkg)? == Ordering::Greater {
        tracing::debug!(from = %pkg, to = %latest.locator, "Found package update");
        return Ok(PackageUpdate {
            from: pkg.clone(),
            to: latest.locator,
        });
    }
    Err(PackError::NotFound(format!("{pkg} is already at the latest version")))
}

/// Validate that `from` may be upgraded to `to`.
///
/// Both must belong to the same line and `to` must be strictly newer.
///
/// # Errors
///
/// Returns `PackError::InvalidArgument` naming both packages otherwise.
pub fn check_update_package(from: &Locator, to: &Locator) -> Result<()> {
    if !from.same_line(to) {
        return Err(PackError::InvalidArgument(format!(
            "cannot update to {to}: a different application is installed ({from})"
        )));
    }
    let ordering = from.cmp_version(to).map_err(|e| {
        PackError::InvalidArgument(format!("cannot compare {from} with {to}: {e}"))
    })?;
    if ordering != Ordering::Less {
        return Err(PackError::InvalidArgument(format!(
            "update version {} must be greater than the installed version {}",
            to.version, from.version
        )));
    }
    Ok(())
}

/// Labels marking a configuration package as owned by `loc`'s line.
#[must_use]
pub fn config_labels(loc: &Locator, purpose: &str) -> Labels {
    Labels::from([
        (labels::CONFIG.to_string(), loc.zero_version().to_string()),
        (labels::PURPOSE.to_string(), purpose.to_string()),
    ])
}

/// Labels marking a configuration package as owned by `loc`'s line on `node`.
#[must_use]
pub fn node_config_labels(loc: &Locator, purpose: &str, node: &str) -> Labels {
    let mut labels = config_labels(loc, purpose);
    labels.insert(labels::NODE.to_string(), node.to_string());
    labels
}

/// Resolve a `latest` locator to the newest concrete version of its line.
///
/// Other locators are returned unchanged.
///
/// # Errors
///
/// Returns `PackError::NotFound` if a `latest` locator's line is empty.
pub fn process_metadata<S: PackageService + ?Sized>(service: &S, loc: &Locator) -> Result<Locator> {
    if !loc.is_latest() {
        return Ok(loc.clone());
    }
    let latest = find_latest_package(service, loc)?;
    tracing::debug!(requested = %loc, resolved = %latest.locator, "Resolved latest package");
    Ok(latest.locator)
}
