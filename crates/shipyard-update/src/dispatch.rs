//! Phase executor dispatch.
//!
//! Plans name their executors with stable wire strings. [`ExecutorKind`] is
//! the closed vocabulary those strings map to; a plan carrying a name outside
//! it was produced by a different version and is rejected as a whole.

use std::fmt;
use std::sync::Arc;

use shipyard_store::PackageService;

use crate::cluster::ClusterOperator;
use crate::error::{Result, UpdateError};
use crate::executor::{ExecutorParams, FsmSpec, PhaseExecutor, Remote};
use crate::phases::{ActionPhase, AppPhase, ChecksPhase, ConfigPhase, InitPhase, NodePhase};
use crate::types::{OperationType, Phase, Plan};

/// Executors of the update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Validate the update path.
    UpdateInit,
    /// Preflight checks on every node.
    UpdateChecks,
    /// Node bootstrap.
    UpdateBootstrap,
    /// Node system software update.
    UpdateSystem,
    /// Application pre-update hook.
    PreUpdate,
    /// Cluster DNS setup.
    CoreDns,
    /// Application update.
    UpdateApp,
    /// Leader election control.
    ElectionStatus,
    /// Taint a node.
    TaintNode,
    /// Untaint a node.
    UntaintNode,
    /// Drain a node.
    DrainNode,
    /// Uncordon a node.
    UncordonNode,
    /// Wait for service endpoints.
    Endpoints,
    /// Runtime configuration package.
    Config,
    /// Kubelet permission fixups.
    KubeletPermissions,
    /// Trusted cluster link migration.
    Links,
    /// Node label refresh.
    Labels,
    /// Role migration.
    Roles,
    /// Etcd backup.
    EtcdBackup,
    /// Etcd shutdown.
    EtcdShutdown,
    /// Etcd upgrade.
    EtcdUpgrade,
    /// Etcd restore.
    EtcdRestore,
    /// Etcd restart.
    EtcdRestart,
    /// Restart of the cluster controller depending on etcd.
    EtcdRestartGravity,
    /// Node cleanup.
    CleanupNode,
}

impl ExecutorKind {
    /// Every executor, in wire-vocabulary order.
    pub const ALL: [Self; 25] = [
        Self::UpdateInit,
        Self::UpdateChecks,
        Self::UpdateBootstrap,
        Self::UpdateSystem,
        Self::PreUpdate,
        Self::CoreDns,
        Self::UpdateApp,
        Self::ElectionStatus,
        Self::TaintNode,
        Self::UntaintNode,
        Self::DrainNode,
        Self::UncordonNode,
        Self::Endpoints,
        Self::Config,
        Self::KubeletPermissions,
        Self::Links,
        Self::Labels,
        Self::Roles,
        Self::EtcdBackup,
        Self::EtcdShutdown,
        Self::EtcdUpgrade,
        Self::EtcdRestore,
        Self::EtcdRestart,
        Self::EtcdRestartGravity,
        Self::CleanupNode,
    ];

    /// Wire name used in plans.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UpdateInit => "update_init",
            Self::UpdateChecks => "update_checks",
            Self::UpdateBootstrap => "update_bootstrap",
            Self::UpdateSystem => "update_system",
            Self::PreUpdate => "pre_update",
            Self::CoreDns => "coredns",
            Self::UpdateApp => "update_app",
            Self::ElectionStatus => "election_status",
            Self::TaintNode => "taint_node",
            Self::UntaintNode => "untaint_node",
            Self::DrainNode => "drain_node",
            Self::UncordonNode => "uncordon_node",
            Self::Endpoints => "endpoints",
            Self::Config => "config",
            Self::KubeletPermissions => "kubelet_permissions",
            Self::Links => "links",
            Self::Labels => "labels",
            Self::Roles => "roles",
            Self::EtcdBackup => "etcd_backup",
            Self::EtcdShutdown => "etcd_shutdown",
            Self::EtcdUpgrade => "etcd_upgrade",
            Self::EtcdRestore => "etcd_restore",
            Self::EtcdRestart => "etcd_restart",
            Self::EtcdRestartGravity => "etcd_restart_gravity",
            Self::CleanupNode => "cleanup_node",
        }
    }

    /// Short description used when a phase has none.
    #[must_use]
    pub const fn summary(self) -> &'static str {
        match self {
            Self::UpdateInit => "Initialize update",
            Self::UpdateChecks => "Run preflight checks",
            Self::UpdateBootstrap => "Bootstrap node",
            Self::UpdateSystem => "Update system software",
            Self::PreUpdate => "Run pre-update hook",
            Self::CoreDns => "Configure cluster DNS",
            Self::UpdateApp => "Update application",
            Self::ElectionStatus => "Change leader election",
            Self::TaintNode => "Taint node",
            Self::UntaintNode => "Remove node taint",
            Self::DrainNode => "Drain node",
            Self::UncordonNode => "Uncordon node",
            Self::Endpoints => "Wait for service endpoints",
            Self::Config => "Update runtime configuration",
            Self::KubeletPermissions => "Fix kubelet permissions",
            Self::Links => "Migrate trusted cluster links",
            Self::Labels => "Refresh node labels",
            Self::Roles => "Migrate roles",
            Self::EtcdBackup => "Back up etcd",
            Self::EtcdShutdown => "Shut down etcd",
            Self::EtcdUpgrade => "Upgrade etcd",
            Self::EtcdRestore => "Restore etcd data",
            Self::EtcdRestart => "Restart etcd",
            Self::EtcdRestartGravity => "Restart cluster controller",
            Self::CleanupNode => "Clean up node",
        }
    }

    /// Look up an executor by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve `phase`'s executor for a dispatch table serving `operation`.
///
/// Checks, in order: the executor is declared, the plan's operation matches,
/// and the name is in the vocabulary.
///
/// # Errors
///
/// Returns `UpdateError::MissingExecutor`, `UpdateError::UnsupportedOperation`
/// or `UpdateError::UnknownExecutor`.
pub fn resolve_executor(operation: OperationType, plan: &Plan, phase: &Phase) -> Result<ExecutorKind> {
    if phase.executor.is_empty() {
        return Err(UpdateError::MissingExecutor {
            phase: phase.id.clone(),
        });
    }
    if plan.operation_type != operation {
        return Err(UpdateError::UnsupportedOperation {
            expected: operation,
            actual: plan.operation_type,
        });
    }
    ExecutorKind::from_name(&phase.executor).ok_or_else(|| UpdateError::UnknownExecutor {
        phase: phase.id.clone(),
        executor: phase.executor.clone(),
    })
}

/// Dispatch table of the update operation.
pub struct UpdateDispatcher {
    packages: Arc<dyn PackageService>,
    cluster: Arc<dyn ClusterOperator>,
}

impl UpdateDispatcher {
    /// The one operation this table serves.
    pub const OPERATION: OperationType = OperationType::Update;

    /// Create a dispatcher over a package store and cluster operator.
    #[must_use]
    pub fn new(packages: Arc<dyn PackageService>, cluster: Arc<dyn ClusterOperator>) -> Self {
        Self { packages, cluster }
    }

    /// Resolve `phase`'s executor kind.
    ///
    /// # Errors
    ///
    /// See [`resolve_executor`].
    pub fn resolve(&self, plan: &Plan, phase: &Phase) -> Result<ExecutorKind> {
        resolve_executor(Self::OPERATION, plan, phase)
    }
}

impl FsmSpec for UpdateDispatcher {
    fn check(&self, plan: &Plan, phase: &Phase) -> Result<()> {
        self.resolve(plan, phase).map(|_| ())
    }

    fn executor(
        &self,
        params: &ExecutorParams<'_>,
        remote: Option<Arc<dyn Remote>>,
    ) -> Result<Box<dyn PhaseExecutor>> {
        let kind = self.resolve(params.plan, params.phase)?;
        tracing::debug!(phase = %params.phase.id, executor = %kind, "Dispatching phase");

        let packages = Arc::clone(&self.packages);
        let cluster = Arc::clone(&self.cluster);
        Ok(match kind {
            ExecutorKind::UpdateInit => Box::new(InitPhase::new(params, packages)?),
            ExecutorKind::UpdateChecks => Box::new(ChecksPhase::new(params, remote)?),
            ExecutorKind::UpdateBootstrap | ExecutorKind::UpdateSystem | ExecutorKind::CleanupNode => {
                Box::new(NodePhase::new(kind, params, remote)?)
            }
            ExecutorKind::UpdateApp => Box::new(AppPhase::new(params, packages, cluster)?),
            ExecutorKind::Config => Box::new(ConfigPhase::new(params, packages)?),
            ExecutorKind::PreUpdate
            | ExecutorKind::CoreDns
            | ExecutorKind::ElectionStatus
            | ExecutorKind::TaintNode
            | ExecutorKind::UntaintNode
            | ExecutorKind::DrainNode
            | ExecutorKind::UncordonNode
            | ExecutorKind::Endpoints
            | ExecutorKind::KubeletPermissions
            | ExecutorKind::Links
            | ExecutorKind::Labels
            | ExecutorKind::Roles
            | ExecutorKind::EtcdBackup
            | ExecutorKind::EtcdShutdown
            | ExecutorKind::EtcdUpgrade
            | ExecutorKind::EtcdRestore
            | ExecutorKind::EtcdRestart
            | ExecutorKind::EtcdRestartGravity => Box::new(ActionPhase::new(kind, params, cluster)?),
        })
    }
}
