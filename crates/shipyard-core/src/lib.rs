//! Core package identity types for shipyard.
//!
//! This crate provides the foundational value types used throughout shipyard:
//!
//! - **Locators**: the `repository/name:version` identity of one package version
//! - **Labels**: the key/value vocabulary that relates packages to each other
//! - **Error types**: locator and version parsing failures
//!
//! # Example
//!
//! ```
//! use shipyard_core::Locator;
//!
//! let loc: Locator = "example.com/web:1.2.0".parse().unwrap();
//! assert_eq!(loc.name, "web");
//! assert_eq!(loc.zero_version().to_string(), "example.com/web:0.0.0");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod labels;
pub mod loc;

pub use error::{LocatorError, Result};
pub use labels::Labels;
pub use loc::{Locator, ZERO_VERSION};
