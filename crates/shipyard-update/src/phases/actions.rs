//! Phases that are a fixed list of cluster actions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::{ClusterAction, ClusterOperator};
use crate::dispatch::ExecutorKind;
use crate::error::{Result, UpdateError};
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor};

/// Applies `forward` on execute and `inverse` on rollback, in order.
pub struct ActionPhase {
    description: String,
    forward: Vec<ClusterAction>,
    inverse: Vec<ClusterAction>,
    cluster: Arc<dyn ClusterOperator>,
}

impl ActionPhase {
    /// Build the action lists for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase lacks a node,
    /// update or election data `kind` needs, or if `kind` is not an action
    /// phase.
    pub fn new(
        kind: ExecutorKind,
        params: &ExecutorParams<'_>,
        cluster: Arc<dyn ClusterOperator>,
    ) -> Result<Self> {
        use ClusterAction as A;

        let node = || params.server().map(|s| s.hostname.clone());
        let (forward, inverse) = match kind {
            ExecutorKind::PreUpdate => {
                let package = params.update()?.to.clone();
                (vec![A::RunHook { package, hook: "pre-update".to_string() }], vec![])
            }
            ExecutorKind::CoreDns => (vec![A::UpdateCoreDns], vec![]),
            ExecutorKind::ElectionStatus => {
                let changes = params.phase.data.election_changes.clone().ok_or_else(|| {
                    UpdateError::InvalidPhaseData {
                        phase: params.phase.id.clone(),
                        reason: format!("{kind} requires election changes"),
                    }
                })?;
                (
                    vec![A::SetLeaderElection {
                        enable: changes.enable.clone(),
                        disable: changes.disable.clone(),
                    }],
                    vec![A::SetLeaderElection {
                        enable: changes.disable,
                        disable: changes.enable,
                    }],
                )
            }
            ExecutorKind::TaintNode => {
                let node = node()?;
                (vec![A::Taint { node: node.clone() }], vec![A::Untaint { node }])
            }
            ExecutorKind::UntaintNode => {
                let node = node()?;
                (vec![A::Untaint { node: node.clone() }], vec![A::Taint { node }])
            }
            ExecutorKind::DrainNode => {
                let node = node()?;
                (vec![A::Drain { node: node.clone() }], vec![A::Uncordon { node }])
            }
            ExecutorKind::UncordonNode => (vec![A::Uncordon { node: node()? }], vec![]),
            ExecutorKind::Endpoints => (vec![A::WaitForEndpoints], vec![]),
            ExecutorKind::KubeletPermissions => (vec![A::UpdateKubeletPermissions], vec![]),
            ExecutorKind::Links => (vec![A::MigrateLinks], vec![]),
            ExecutorKind::Labels => (vec![A::UpdateNodeLabels], vec![]),
            ExecutorKind::Roles => (vec![A::MigrateRoles], vec![]),
            ExecutorKind::EtcdBackup => (vec![A::EtcdBackup { node: node()? }], vec![]),
            ExecutorKind::EtcdShutdown => {
                let node = node()?;
                (vec![A::EtcdShutdown { node: node.clone() }], vec![A::EtcdRestart { node }])
            }
            ExecutorKind::EtcdUpgrade => {
                let node = node()?;
                (
                    vec![A::EtcdUpgrade { node: node.clone() }],
                    vec![A::EtcdRevertUpgrade { node }],
                )
            }
            ExecutorKind::EtcdRestore => (vec![A::EtcdRestore { node: node()? }], vec![]),
            ExecutorKind::EtcdRestart => (vec![A::EtcdRestart { node: node()? }], vec![]),
            ExecutorKind::EtcdRestartGravity => {
                (vec![A::RestartClusterController { node: node()? }], vec![])
            }
            ExecutorKind::UpdateInit
            | ExecutorKind::UpdateChecks
            | ExecutorKind::UpdateBootstrap
            | ExecutorKind::UpdateSystem
            | ExecutorKind::UpdateApp
            | ExecutorKind::Config
            | ExecutorKind::CleanupNode => {
                return Err(UpdateError::InvalidPhaseData {
                    phase: params.phase.id.clone(),
                    reason: format!("{kind} is not an action phase"),
                })
            }
        };

        let description = if params.phase.description.is_empty() {
            kind.summary().to_string()
        } else {
            params.phase.description.clone()
        };

        Ok(Self {
            description,
            forward,
            inverse,
            cluster,
        })
    }

    async fn apply_all(&self, ctx: &ExecutionContext, actions: &[ClusterAction]) -> Result<()> {
        for action in actions {
            ctx.check_cancelled()?;
            tracing::debug!(phase = %ctx.phase_id, ?action, "Applying cluster action");
            self.cluster.apply(action).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PhaseExecutor for ActionPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        self.apply_all(ctx, &self.forward).await
    }

    async fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        self.apply_all(ctx, &self.inverse).await
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plan_with, server, RecordingCluster};
    use crate::types::{ElectionChange, Phase, PhaseData};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("/p", CancellationToken::new(), 1)
    }

    #[tokio::test]
    async fn drain_and_uncordon_on_rollback() {
        let cluster = Arc::new(RecordingCluster::default());
        let phase = Phase::new("/drain", "drain_node").with_data(PhaseData {
            server: Some(server("node-1")),
            ..PhaseData::default()
        });
        let plan = plan_with(vec![phase.clone()]);
        let executor =
            ActionPhase::new(ExecutorKind::DrainNode, &ExecutorParams::new(&plan, &phase), cluster.clone())
                .unwrap();

        executor.execute(&ctx()).await.unwrap();
        executor.rollback(&ctx()).await.unwrap();

        assert_eq!(
            cluster.applied(),
            vec![
                ClusterAction::Drain { node: "node-1".into() },
                ClusterAction::Uncordon { node: "node-1".into() },
            ]
        );
        assert_eq!(executor.describe(), "Drain node");
    }

    #[tokio::test]
    async fn election_rollback_swaps_membership() {
        let cluster = Arc::new(RecordingCluster::default());
        let phase = Phase::new("/election", "election_status").with_data(PhaseData {
            election_changes: Some(ElectionChange {
                enable: vec!["node-2".into()],
                disable: vec!["node-1".into()],
            }),
            ..PhaseData::default()
        });
        let plan = plan_with(vec![phase.clone()]);
        let executor = ActionPhase::new(
            ExecutorKind::ElectionStatus,
            &ExecutorParams::new(&plan, &phase),
            cluster.clone(),
        )
        .unwrap();

        executor.rollback(&ctx()).await.unwrap();
        assert_eq!(
            cluster.applied(),
            vec![ClusterAction::SetLeaderElection {
                enable: vec!["node-1".into()],
                disable: vec!["node-2".into()],
            }]
        );
    }

    #[test]
    fn node_phases_require_server() {
        let phase = Phase::new("/taint", "taint_node");
        let plan = plan_with(vec![phase.clone()]);
        let result = ActionPhase::new(
            ExecutorKind::TaintNode,
            &ExecutorParams::new(&plan, &phase),
            Arc::new(RecordingCluster::default()),
        );
        assert!(matches!(result, Err(UpdateError::InvalidPhaseData { .. })));
    }

    #[tokio::test]
    async fn cancelled_before_first_action() {
        let cluster = Arc::new(RecordingCluster::default());
        let phase = Phase::new("/endpoints", "endpoints");
        let plan = plan_with(vec![phase.clone()]);
        let executor =
            ActionPhase::new(ExecutorKind::Endpoints, &ExecutorParams::new(&plan, &phase), cluster.clone())
                .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = executor
            .execute(&ExecutionContext::new("/endpoints", token, 1))
            .await;
        assert!(matches!(result, Err(UpdateError::Cancelled { .. })));
        assert!(cluster.applied().is_empty());
    }
}
