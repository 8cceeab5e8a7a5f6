//! Phases whose work happens on one node.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::ExecutorKind;
use crate::error::Result;
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor, Remote};
use crate::types::Server;

/// Delegates `update_bootstrap`, `update_system` and `cleanup_node` to the
/// target node through [`Remote`].
pub struct NodePhase {
    kind: ExecutorKind,
    phase_id: String,
    server: Server,
    remote: Arc<dyn Remote>,
}

impl NodePhase {
    /// Create the executor.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase names no server or
    /// no remote handle is available.
    pub fn new(
        kind: ExecutorKind,
        params: &ExecutorParams<'_>,
        remote: Option<Arc<dyn Remote>>,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            phase_id: params.phase.id.clone(),
            server: params.server()?.clone(),
            remote: params.require_remote(remote)?,
        })
    }
}

#[async_trait]
impl PhaseExecutor for NodePhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.check_cancelled()?;
        tracing::info!(phase = %self.phase_id, server = %self.server.hostname, executor = %self.kind, "Executing on node");
        self.remote.execute_phase(&self.server, &self.phase_id).await
    }

    async fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.check_cancelled()?;
        tracing::info!(phase = %self.phase_id, server = %self.server.hostname, executor = %self.kind, "Rolling back on node");
        self.remote.rollback_phase(&self.server, &self.phase_id).await
    }

    fn describe(&self) -> String {
        format!("{} on {}", self.kind.summary(), self.server.hostname)
    }
}
