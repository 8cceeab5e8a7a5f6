//! Package resolution and configuration for shipyard.
//!
//! This crate sits on top of a [`PackageService`](shipyard_store::PackageService)
//! and provides:
//!
//! - [`resolver`]: finding installed, latest and config packages, and
//!   computing or validating updates
//! - [`manifest`]: the `manifest.json` model every package carries
//! - [`config`]: deriving configuration packages from caller arguments
//! - [`archive`]: decompression and idempotent unpacking
//! - [`exec`]: running manifest commands behind a [`CommandRunner`]
//!
//! # Example
//!
//! ```no_run
//! use shipyard_pack::resolver::find_package_update;
//! use shipyard_store::RocksPackageStore;
//!
//! let store = RocksPackageStore::open("/var/lib/shipyard").unwrap();
//! match find_package_update(&store, &"example.com/web:1.0.0".parse().unwrap()) {
//!     Ok(update) => println!("update available: {update}"),
//!     Err(e) if e.is_not_found() => println!("up to date"),
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod archive;
pub mod config;
pub mod error;
pub mod exec;
pub mod manifest;
pub mod resolver;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{configure_package, get_config_package, read_config_package, Vars, VARS_FILE};
pub use error::{PackError, Result};
pub use exec::{execute_package_command, CommandInvocation, CommandRunner, ProcessRunner};
pub use manifest::{package_manifest, CommandSpec, ConfigParam, ConfigSpec, Manifest, MANIFEST_FILE};
pub use resolver::{
    check_update_package, config_labels, find_config_package, find_installed_package,
    find_installed_package_with_config, find_latest_package, find_latest_package_by_name,
    find_latest_package_predicate, find_latest_package_with_labels, find_newer_packages,
    find_node_config_package, find_package, find_package_update, foreach_package,
    foreach_package_in_repo, node_config_labels, process_metadata,
};
