//! Helpers for building packages in tests.

use parking_lot::Mutex;
use shipyard_core::{Labels, Locator};
use shipyard_store::{CreateOptions, MemoryPackageStore, PackageEnvelope, PackageService};

use crate::archive::write_archive;
use crate::error::Result;
use crate::exec::{CommandInvocation, CommandRunner};
use crate::manifest::{CommandSpec, ConfigParam, ConfigSpec, Manifest, MANIFEST_FILE};

/// A configurable application manifest with a `hook` command.
///
/// Parameters: `--domain` (required, `DOMAIN`) and `--replicas`
/// (default `3`, `REPLICAS`).
#[must_use]
pub fn app_manifest() -> Manifest {
    Manifest {
        config: Some(ConfigSpec {
            params: vec![
                ConfigParam {
                    name: "domain".to_string(),
                    env: "DOMAIN".to_string(),
                    description: "Public domain name".to_string(),
                    required: true,
                    default: None,
                },
                ConfigParam {
                    name: "replicas".to_string(),
                    env: "REPLICAS".to_string(),
                    description: String::new(),
                    required: false,
                    default: Some("3".to_string()),
                },
            ],
        }),
        commands: [(
            "hook".to_string(),
            CommandSpec {
                args: vec!["/bin/sh".to_string(), "hook.sh".to_string()],
            },
        )]
        .into(),
    }
}

/// A gzip'd package archive holding `manifest` and a trivial `hook.sh`.
///
/// # Panics
///
/// Panics if the archive cannot be built.
#[must_use]
pub fn manifest_archive(manifest: &Manifest) -> Vec<u8> {
    let json = serde_json::to_vec(manifest).expect("manifest serializes");
    write_archive(&[(MANIFEST_FILE, json.as_slice()), ("hook.sh", &b"echo hook\n"[..])]).expect("archive builds")
}

/// Store a package built from `manifest` in `service`.
///
/// # Errors
///
/// Returns an error if `loc` is malformed or the store rejects the package.
pub fn create_package<S: PackageService + ?Sized>(
    service: &S,
    loc: &str,
    manifest: &Manifest,
    labels: Labels,
) -> Result<PackageEnvelope> {
    let loc: Locator = loc.parse()?;
    let data = manifest_archive(manifest);
    Ok(service.create_package(&loc, &mut data.as_slice(), CreateOptions::with_labels(labels))?)
}

/// A memory store holding one package built from `manifest`.
///
/// # Panics
///
/// Panics if `loc` is malformed.
#[must_use]
pub fn store_with_package(
    loc: &str,
    manifest: &Manifest,
    labels: Labels,
) -> (MemoryPackageStore, Locator) {
    let store = MemoryPackageStore::new();
    let envelope = create_package(&store, loc, manifest, labels).expect("package is created");
    (store, envelope.locator)
}

/// [`CommandRunner`] that records invocations and returns canned output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    output: Vec<u8>,
    exit_status: Option<String>,
    invocations: Mutex<Vec<CommandInvocation>>,
}

impl RecordingRunner {
    /// Succeed every run with `output`.
    #[must_use]
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    /// Fail every run with `status`, carrying `output`.
    #[must_use]
    pub fn failing(output: Vec<u8>, status: &str) -> Self {
        Self {
            output,
            exit_status: Some(status.to_string()),
            invocations: Mutex::default(),
        }
    }

    /// Every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.lock().clone()
    }

    /// The most recent invocation.
    #[must_use]
    pub fn last(&self) -> Option<CommandInvocation> {
        self.invocations.lock().last().cloned()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &CommandInvocation) -> Result<Vec<u8>> {
        self.invocations.lock().push(invocation.clone());
        match &self.exit_status {
            Some(status) => Err(crate::PackError::CommandFailed {
                command: invocation.args.join(" "),
                status: status.clone(),
                output: self.output.clone(),
            }),
            None => Ok(self.output.clone()),
        }
    }
}
