//! Package manifests.
//!
//! Every package carries a `manifest.json` at the root of its archive that
//! declares its configuration parameters and named commands.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shipyard_core::Locator;
use shipyard_store::PackageService;

use crate::archive::{decompress, is_root_entry};
use crate::error::{PackError, Result};

/// File name of the manifest inside a package archive.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Configuration schema, if the package is configurable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSpec>,
    /// Named commands.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandSpec>,
}

/// A command the package can run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program followed by its arguments.
    pub args: Vec<String>,
}

/// Declared configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSpec {
    /// Parameters in declaration order.
    #[serde(default)]
    pub params: Vec<ConfigParam>,
}

/// One configuration parameter, passed as `--name value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigParam {
    /// Flag name.
    pub name: String,
    /// Environment variable the value is bound to.
    pub env: String,
    /// Help text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Value used when the parameter is not supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Manifest {
    /// Parse a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `PackError::InvalidManifest` if the bytes are not a manifest.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PackError::InvalidManifest(e.to_string()))
    }

    /// Resolve a named command.
    ///
    /// # Errors
    ///
    /// Returns `PackError::NotFound` if the command is not declared.
    pub fn command(&self, name: &str) -> Result<&CommandSpec> {
        self.commands
            .get(name)
            .ok_or_else(|| PackError::NotFound(format!("command {name:?} is not declared in the manifest")))
    }
}

impl ConfigSpec {
    /// Parse `args` against the declared parameters.
    ///
    /// Returns the environment bindings (env name to value) of every parameter
    /// that was supplied or has a default.
    ///
    /// # Errors
    ///
    /// Returns `PackError::InvalidManifest` if the declared parameters are
    /// invalid, and `PackError::BadArguments` for unknown flags, missing
    /// required parameters or stray values.
    pub fn parse_args(&self, args: &[String]) -> Result<BTreeMap<String, String>> {
        self.validate()?;
        let command = self.params.iter().fold(
            clap::Command::new("config")
                .no_binary_name(true)
                .disable_help_flag(true)
                .disable_version_flag(true),
            |command, param| {
                let mut arg = clap::Arg::new(param.name.clone())
                    .long(param.name.clone())
                    .num_args(1)
                    .value_parser(clap::value_parser!(String))
                    .help(param.description.clone());
                if let Some(default) = &param.default {
                    arg = arg.default_value(default.clone());
                } else if param.required {
                    arg = arg.required(true);
                }
                command.arg(arg)
            },
        );

        let matches = command
            .try_get_matches_from(args)
            .map_err(|e| PackError::BadArguments(e.to_string().trim().to_string()))?;

        Ok(self
            .params
            .iter()
            .filter_map(|param| {
                matches
                    .get_one::<String>(&param.name)
                    .map(|value| (param.env.clone(), value.clone()))
            })
            .collect())
    }

    /// Check that every parameter has a usable, unique flag name.
    ///
    /// # Errors
    ///
    /// Returns `PackError::InvalidManifest` naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for param in &self.params {
            let name = param.name.as_str();
            if name.is_empty()
                || name.starts_with('-')
                || name.contains(|c: char| c == '=' || c.is_whitespace())
            {
                return Err(PackError::InvalidManifest(format!(
                    "invalid config parameter name {name:?}"
                )));
            }
            if !seen.insert(name) {
                return Err(PackError::InvalidManifest(format!(
                    "config parameter {name:?} is declared more than once"
                )));
            }
        }
        Ok(())
    }
}

/// Find and parse the manifest inside a (decompressed) tar stream.
///
/// # Errors
///
/// Returns `PackError::InvalidManifest` if the archive has no manifest, or an
/// I/O error if the archive is unreadable.
pub fn read_manifest<R: Read>(archive: &mut tar::Archive<R>) -> Result<Manifest> {
    let entries = archive
        .entries()
        .map_err(|e| PackError::io("failed to read archive entries", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PackError::io("failed to read archive entry", e))?;
        let is_manifest = entry
            .path()
            .map(|path| is_root_entry(&path, MANIFEST_FILE))
            .map_err(|e| PackError::io("failed to read archive entry path", e))?;
        if is_manifest {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| PackError::io("failed to read manifest", e))?;
            return Manifest::from_slice(&bytes);
        }
    }

    Err(PackError::InvalidManifest(format!("archive has no {MANIFEST_FILE}")))
}

/// Read the manifest of an unpacked package directory.
///
/// # Errors
///
/// Returns an I/O error if the file is unreadable, or
/// `PackError::InvalidManifest` if it does not parse.
pub fn open_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = fs::read(&path)
        .map_err(|e| PackError::io(format!("failed to read {}", path.display()), e))?;
    Manifest::from_slice(&bytes)
}

/// Read the manifest of a stored package without unpacking it.
///
/// # Errors
///
/// Returns an error if the package cannot be read or has no valid manifest.
pub fn package_manifest<S: PackageService + ?Sized>(service: &S, loc: &Locator) -> Result<Manifest> {
    let (_, reader) = service.read_package(loc)?;
    let mut archive = tar::Archive::new(decompress(reader)?);
    read_manifest(&mut archive).map_err(|e| match e {
        PackError::InvalidManifest(reason) => PackError::InvalidManifest(format!("{loc}: {reason}")),
        other => other,
    })
}
