//! Configuration packages.
//!
//! A configuration package is derived from an application package: its
//! manifest's parameter schema is applied to caller arguments and the
//! resulting environment bindings are stored as a new package, linked back to
//! the application line by labels only.

use std::collections::BTreeMap;
use std::io::Read;

use shipyard_core::{labels, Labels, Locator};
use shipyard_store::{CreateOptions, PackageEnvelope, PackageService};

use crate::archive::{decompress, is_root_entry, write_archive};
use crate::error::{PackError, Result};
use crate::manifest::{package_manifest, Manifest, MANIFEST_FILE};

/// File holding the environment bindings inside a configuration package.
pub const VARS_FILE: &str = "vars.json";

/// Environment bindings: variable name to value.
pub type Vars = BTreeMap<String, String>;

/// Build a configuration package for `loc` from `args`, in memory.
///
/// The source package is only read.
///
/// # Errors
///
/// Returns `PackError::InvalidManifest` if `loc` declares no configuration
/// parameters and `PackError::BadArguments` if `args` do not match them.
pub fn get_config_package<S: PackageService + ?Sized>(
    service: &S,
    loc: &Locator,
    conf_loc: &Locator,
    args: &[String],
) -> Result<Vec<u8>> {
    let manifest = package_manifest(service, loc)?;
    let Some(config) = manifest.config else {
        return Err(PackError::InvalidManifest(format!(
            "{loc} does not declare configuration parameters"
        )));
    };

    let vars = config.parse_args(args).map_err(|e| {
        tracing::warn!(package = %loc, error = %e, "Rejected configuration arguments");
        e
    })?;

    let schema = Manifest {
        config: Some(config),
        commands: BTreeMap::new(),
    };
    tracing::debug!(package = %loc, config = %conf_loc, vars = vars.len(), "Built configuration package");
    write_config_package(&schema, &vars)
}

/// Build a configuration package for `loc` and store it as `conf_loc`.
///
/// The package is labelled as owned by `loc`'s line; `extra_labels` are merged
/// on top. Callers must not create the same `conf_loc` concurrently.
///
/// # Errors
///
/// Returns the errors of [`get_config_package`], or
/// `StoreError::AlreadyExists` if `conf_loc` is taken.
pub fn configure_package<S: PackageService + ?Sized>(
    service: &S,
    loc: &Locator,
    conf_loc: &Locator,
    args: &[String],
    extra_labels: &Labels,
) -> Result<PackageEnvelope> {
    let data = get_config_package(service, loc, conf_loc, args)?;

    let mut all = Labels::from([(labels::CONFIG.to_string(), loc.zero_version().to_string())]);
    all.extend(extra_labels.iter().map(|(k, v)| (k.clone(), v.clone())));

    let envelope = service.create_package(conf_loc, &mut data.as_slice(), CreateOptions::with_labels(all))?;
    tracing::info!(package = %loc, config = %conf_loc, "Created configuration package");
    Ok(envelope)
}

/// Serialize a configuration package archive.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn write_config_package(schema: &Manifest, vars: &Vars) -> Result<Vec<u8>> {
    let manifest = serde_json::to_vec_pretty(schema)
        .map_err(|e| PackError::InvalidManifest(e.to_string()))?;
    let vars = serde_json::to_vec_pretty(vars)
        .map_err(|e| PackError::InvalidManifest(e.to_string()))?;
    write_archive(&[(MANIFEST_FILE, manifest.as_slice()), (VARS_FILE, vars.as_slice())])
}

/// Decode the environment bindings of a configuration package archive.
///
/// # Errors
///
/// Returns `PackError::InvalidManifest` if the archive has no valid
/// `vars.json`.
pub fn read_config_package(reader: impl Read) -> Result<Vars> {
    let mut archive = tar::Archive::new(decompress(reader)?);
    let entries = archive
        .entries()
        .map_err(|e| PackError::io("failed to read configuration package", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PackError::io("failed to read configuration package", e))?;
        let is_vars = entry
            .path()
            .map(|path| is_root_entry(&path, VARS_FILE))
            .map_err(|e| PackError::io("failed to read configuration package", e))?;
        if is_vars {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| PackError::io("failed to read configuration package", e))?;
            return serde_json::from_slice(&bytes)
                .map_err(|e| PackError::InvalidManifest(format!("invalid {VARS_FILE}: {e}")));
        }
    }

    Err(PackError::InvalidManifest(format!(
        "configuration package has no {VARS_FILE}"
    )))
}
