//! Cluster-level actions.
//!
//! Concrete node actions (draining, tainting, etcd maintenance) are carried out
//! by a [`ClusterOperator`]; executors only decide which actions to apply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipyard_core::Locator;

use crate::error::Result;

/// One unit of cluster state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClusterAction {
    /// Keep workloads off a node.
    Taint {
        /// Node name.
        node: String,
    },
    /// Allow workloads on a node again.
    Untaint {
        /// Node name.
        node: String,
    },
    /// Evict workloads from a node.
    Drain {
        /// Node name.
        node: String,
    },
    /// Mark a node schedulable.
    Uncordon {
        /// Node name.
        node: String,
    },
    /// Wait until cluster service endpoints are ready.
    WaitForEndpoints,
    /// Run a package hook.
    RunHook {
        /// Package providing the hook.
        package: Locator,
        /// Hook name.
        hook: String,
    },
    /// Update the cluster DNS configuration.
    UpdateCoreDns,
    /// Apply leader election membership.
    SetLeaderElection {
        /// Nodes to add.
        enable: Vec<String>,
        /// Nodes to remove.
        disable: Vec<String>,
    },
    /// Fix kubelet permissions.
    UpdateKubeletPermissions,
    /// Migrate trusted cluster links.
    MigrateLinks,
    /// Refresh node labels.
    UpdateNodeLabels,
    /// Migrate user roles.
    MigrateRoles,
    /// Back up etcd on a node.
    EtcdBackup {
        /// Node name.
        node: String,
    },
    /// Stop etcd on a node.
    EtcdShutdown {
        /// Node name.
        node: String,
    },
    /// Upgrade etcd on a node.
    EtcdUpgrade {
        /// Node name.
        node: String,
    },
    /// Revert an etcd upgrade on a node.
    EtcdRevertUpgrade {
        /// Node name.
        node: String,
    },
    /// Restore etcd data from backup on a node.
    EtcdRestore {
        /// Node name.
        node: String,
    },
    /// Restart etcd on a node.
    EtcdRestart {
        /// Node name.
        node: String,
    },
    /// Restart the cluster controller that depends on etcd.
    RestartClusterController {
        /// Node name.
        node: String,
    },
}

/// Applies cluster actions.
#[async_trait]
pub trait ClusterOperator: Send + Sync {
    /// Apply `action`.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Cluster` if the action fails.
    async fn apply(&self, action: &ClusterAction) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_tagged() {
        let json = serde_json::to_value(ClusterAction::Drain {
            node: "node-1".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "drain");
        assert_eq!(json["node"], "node-1");

        let json = serde_json::to_value(ClusterAction::WaitForEndpoints).unwrap();
        assert_eq!(json["action"], "wait_for_endpoints");
    }
}
