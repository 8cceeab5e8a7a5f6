//! Label vocabulary.
//!
//! Relationships between packages are expressed as key/value labels rather than
//! structural references: the store enumerates, it never joins.

use std::collections::BTreeMap;

/// Opaque key/value metadata attached to a package.
pub type Labels = BTreeMap<String, String>;

/// Marks the currently active package of an application line.
///
/// The label value is the key itself.
pub const INSTALLED: &str = "installed";

/// Holds the zero-version locator string of the line a config package belongs to.
pub const CONFIG: &str = "config";

/// Hostname of the node a per-node config package belongs to.
pub const NODE: &str = "node";

/// Free-form descriptive metadata.
pub const PURPOSE: &str = "purpose";

/// Build metadata value that asks for the highest concrete version of a line.
pub const LATEST: &str = "latest";

/// Well-known values for the [`PURPOSE`] label.
pub mod purpose {
    /// Configuration package of the cluster runtime.
    pub const RUNTIME_CONFIG: &str = "runtime-config";
    /// Configuration package of an application.
    pub const APP_CONFIG: &str = "app-config";
}

/// Returns the label set marking a package as installed.
#[must_use]
pub fn installed() -> Labels {
    Labels::from([(INSTALLED.to_string(), INSTALLED.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_label_uses_key_as_value() {
        let labels = installed();
        assert_eq!(labels.get(INSTALLED).map(String::as_str), Some(INSTALLED));
        assert_eq!(labels.len(), 1);
    }
}
