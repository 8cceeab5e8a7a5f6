//! `update_init`: validate the update path before anything changes.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_pack::{check_update_package, find_installed_package};
use shipyard_store::{PackageService, PackageUpdate};

use crate::error::{Result, UpdateError};
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor};

/// Verifies that the update's target exists and is a legal upgrade from the
/// installed package.
pub struct InitPhase {
    phase_id: String,
    update: PackageUpdate,
    packages: Arc<dyn PackageService>,
}

impl InitPhase {
    /// Create the executor.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase carries no update.
    pub fn new(params: &ExecutorParams<'_>, packages: Arc<dyn PackageService>) -> Result<Self> {
        Ok(Self {
            phase_id: params.phase.id.clone(),
            update: params.update()?.clone(),
            packages,
        })
    }
}

/// Check that `update.from` is the installed package of its line and that
/// moving to `update.to` is a legal upgrade.
pub(super) fn verify_installed(
    packages: &dyn PackageService,
    phase_id: &str,
    update: &PackageUpdate,
) -> Result<()> {
    let installed = find_installed_package(packages, &update.to)?;
    if installed != update.from {
        return Err(UpdateError::InvalidPhaseData {
            phase: phase_id.to_string(),
            reason: format!("plan updates from {} but {installed} is installed", update.from),
        });
    }
    check_update_package(&installed, &update.to)?;
    Ok(())
}

#[async_trait]
impl PhaseExecutor for InitPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.check_cancelled()?;
        self.packages.read_package_envelope(&self.update.to)?;
        verify_installed(&*self.packages, &self.phase_id, &self.update)?;

        tracing::info!(phase = %self.phase_id, update = %self.update, "Update path validated");
        Ok(())
    }

    async fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        tracing::debug!(phase = %self.phase_id, "Nothing to roll back");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Initialize update {}", self.update)
    }
}
