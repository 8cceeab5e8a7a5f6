//! `update_app`: upgrade the application and move the `installed` label.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::{labels, Labels, Locator};
use shipyard_store::{PackageService, PackageUpdate};

use crate::cluster::{ClusterAction, ClusterOperator};
use crate::error::Result;
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor};
use crate::phases::init::verify_installed;

/// Runs the target package's `update` hook, then marks it installed.
///
/// Rollback marks the previous package installed again and runs its
/// `rollback` hook. Both directions are safe to repeat.
pub struct AppPhase {
    phase_id: String,
    update: PackageUpdate,
    packages: Arc<dyn PackageService>,
    cluster: Arc<dyn ClusterOperator>,
}

impl AppPhase {
    /// Create the executor.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase carries no update.
    pub fn new(
        params: &ExecutorParams<'_>,
        packages: Arc<dyn PackageService>,
        cluster: Arc<dyn ClusterOperator>,
    ) -> Result<Self> {
        Ok(Self {
            phase_id: params.phase.id.clone(),
            update: params.update()?.clone(),
            packages,
            cluster,
        })
    }

    fn is_installed(&self, loc: &Locator) -> Result<bool> {
        Ok(self.packages.read_package_envelope(loc)?.is_installed())
    }

    /// Mark `to` installed, then clear the label from `from`.
    fn move_installed(&self, from: &Locator, to: &Locator) -> Result<()> {
        self.packages.update_package_labels(to, &labels::installed(), &[])?;
        self.packages
            .update_package_labels(from, &Labels::new(), &[labels::INSTALLED.to_string()])?;
        tracing::info!(phase = %self.phase_id, from = %from, to = %to, "Moved installed label");
        Ok(())
    }
}

#[async_trait]
impl PhaseExecutor for AppPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let PackageUpdate { from, to } = &self.update;

        if self.is_installed(to)? {
            // A previous attempt got as far as the label move.
            self.move_installed(from, to)?;
            return Ok(());
        }

        verify_installed(&*self.packages, &self.phase_id, &self.update)?;

        ctx.check_cancelled()?;
        self.cluster
            .apply(&ClusterAction::RunHook {
                package: to.clone(),
                hook: "update".to_string(),
            })
            .await?;

        ctx.check_cancelled()?;
        self.move_installed(from, to)
    }

    async fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let PackageUpdate { from, to } = &self.update;

        if self.is_installed(to)? {
            self.move_installed(to, from)?;
        } else if !self.is_installed(from)? {
            tracing::debug!(phase = %self.phase_id, "Update was never applied");
            return Ok(());
        }

        ctx.check_cancelled()?;
        self.cluster
            .apply(&ClusterAction::RunHook {
                package: from.clone(),
                hook: "rollback".to_string(),
            })
            .await
    }

    fn describe(&self) -> String {
        format!("Update application {}", self.update)
    }
}
