//! Plan and phase data types.
//!
//! Plans are produced by a planner outside this crate and exchanged as JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipyard_core::Locator;
use shipyard_store::PackageUpdate;
use uuid::Uuid;

/// Kind of cluster operation a plan performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Initial installation.
    Install,
    /// Adding a node.
    Expand,
    /// Cluster and application upgrade.
    Update,
    /// Runtime configuration change.
    UpdateConfig,
    /// Runtime environment change.
    UpdateEnviron,
    /// Removal of unused packages.
    GarbageCollect,
}

impl OperationType {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Expand => "expand",
            Self::Update => "update",
            Self::UpdateConfig => "update_config",
            Self::UpdateEnviron => "update_environ",
            Self::GarbageCollect => "garbage_collect",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    /// Not yet run.
    #[default]
    Pending,
    /// Claimed and executing.
    Running,
    /// Executed successfully.
    Completed,
    /// Executed unsuccessfully; awaiting resume or rollback.
    Failed,
    /// Changes undone.
    RolledBack,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        })
    }
}

/// A cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Node name.
    pub hostname: String,
    /// Address other nodes reach it on.
    pub advertise_ip: String,
    /// Whether the node runs the control plane.
    #[serde(default)]
    pub master: bool,
}

/// Leader election changes applied by an `election_status` phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionChange {
    /// Nodes allowed to take part in leader election.
    #[serde(default)]
    pub enable: Vec<String>,
    /// Nodes excluded from leader election.
    #[serde(default)]
    pub disable: Vec<String>,
}

/// Executor-specific phase data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseData {
    /// Node the phase targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Server>,
    /// Package the phase works with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Locator>,
    /// Currently installed package the phase works with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_package: Option<Locator>,
    /// Package update the phase applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PackageUpdate>,
    /// Leader election changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_changes: Option<ElectionChange>,
    /// Arguments passed to configuration or commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// One unit of orchestration work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Unique ID within the plan, e.g. `/masters/node-1/drain`.
    pub id: String,
    /// Executor name.
    #[serde(default)]
    pub executor: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// IDs of phases that must complete first.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Current state.
    #[serde(default)]
    pub state: PhaseState,
    /// Executor-specific data.
    #[serde(default)]
    pub data: PhaseData,
    /// Last state change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Error recorded by the last failed execution or rollback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Phase {
    /// Create a pending phase.
    #[must_use]
    pub fn new(id: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executor: executor.into(),
            description: String::new(),
            requires: Vec::new(),
            state: PhaseState::Pending,
            data: PhaseData::default(),
            updated_at: None,
            error: None,
        }
    }

    /// Add a dependency.
    #[must_use]
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.requires.push(id.into());
        self
    }

    /// Replace the phase data.
    #[must_use]
    pub fn with_data(mut self, data: PhaseData) -> Self {
        self.data = data;
        self
    }
}

/// One orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Operation ID.
    pub operation_id: String,
    /// Operation kind.
    pub operation_type: OperationType,
    /// Cluster the plan targets.
    pub cluster_name: String,
    /// Cluster nodes.
    #[serde(default)]
    pub servers: Vec<Server>,
    /// Phases in planner order.
    pub phases: Vec<Phase>,
}

/// Record of one phase state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChange {
    /// Unique change ID.
    pub id: Uuid,
    /// Phase that changed.
    pub phase_id: String,
    /// Previous state.
    pub from: PhaseState,
    /// New state.
    pub to: PhaseState,
    /// When the change happened.
    pub created: DateTime<Utc>,
    /// Error that caused the change, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
