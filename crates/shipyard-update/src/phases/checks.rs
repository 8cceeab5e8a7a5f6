//! `update_checks`: verify every node before the update starts.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor, Remote};
use crate::types::Server;

/// Runs [`Remote::check_server`] on every plan server, `node_parallelism` at
/// a time.
pub struct ChecksPhase {
    servers: Vec<Server>,
    remote: Arc<dyn Remote>,
}

impl ChecksPhase {
    /// Create the executor.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` without a remote handle.
    pub fn new(params: &ExecutorParams<'_>, remote: Option<Arc<dyn Remote>>) -> Result<Self> {
        Ok(Self {
            servers: params.plan.servers.clone(),
            remote: params.require_remote(remote)?,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ChecksPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let checks: Vec<_> = self
            .servers
            .iter()
            .map(move |server| async move {
                ctx.check_cancelled()?;
                self.remote.check_server(server).await.map_err(|e| {
                    tracing::warn!(phase = %ctx.phase_id, server = %server.hostname, error = %e, "Server check failed");
                    e
                })
            })
            .collect();
        let results: Vec<Result<()>> = stream::iter(checks)
            .buffer_unordered(ctx.node_parallelism)
            .collect()
            .await;

        // All checks run to completion; report the first failure.
        results.into_iter().collect::<Result<Vec<()>>>()?;
        tracing::info!(phase = %ctx.phase_id, servers = self.servers.len(), "All servers passed checks");
        Ok(())
    }

    async fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Run preflight checks on {} servers", self.servers.len())
    }
}
