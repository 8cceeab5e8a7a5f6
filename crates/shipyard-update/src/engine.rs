//! Plan execution engine.
//!
//! [`FsmEngine`] drives a [`Plan`] through its phase state machine: it picks
//! runnable phases, dispatches them through an [`FsmSpec`], records every
//! state change and rolls phases back in reverse dependency order.
//!
//! Plan state lives behind a lock that is never held across an await point.
//! A phase is claimed for the duration of an execution or rollback, so two
//! callers can never work on the same phase at once.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::executor::{ExecutionContext, ExecutorParams, FsmSpec, Remote};
use crate::lifecycle;
use crate::types::{Phase, PhaseState, Plan, PlanChange};

/// Outcome of one [`FsmEngine::step`].
#[derive(Debug, Default)]
pub struct StepReport {
    /// Phases that completed.
    pub completed: Vec<String>,
    /// Phases that failed, with their errors.
    pub failed: Vec<(String, UpdateError)>,
}

impl StepReport {
    /// Returns true if the step ran nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty()
    }
}

struct Claim<'a> {
    claims: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.id);
    }
}

/// Executes an update plan.
pub struct FsmEngine<S: FsmSpec> {
    spec: S,
    plan: RwLock<Plan>,
    changelog: Mutex<Vec<PlanChange>>,
    claims: Mutex<HashSet<String>>,
    remote: Option<Arc<dyn Remote>>,
    config: UpdateConfig,
    cancel: CancellationToken,
}

impl<S: FsmSpec> FsmEngine<S> {
    /// Create an engine for `plan`.
    ///
    /// # Errors
    ///
    /// Returns a plan-integrity error if the plan structure is invalid, or
    /// `UpdateError::Config` if the configuration is.
    pub fn new(spec: S, plan: Plan, config: UpdateConfig) -> Result<Self> {
        plan.validate()?;
        config.validate()?;
        Ok(Self {
            spec,
            plan: RwLock::new(plan),
            changelog: Mutex::new(Vec::new()),
            claims: Mutex::new(HashSet::new()),
            remote: None,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Hand executors a remote execution handle.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Token that stops the engine between phases and executors between
    /// node operations.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the plan.
    #[must_use]
    pub fn plan(&self) -> Plan {
        self.plan.read().clone()
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Current state of one phase.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::PhaseNotFound` if the phase doesn't exist.
    pub fn phase_state(&self, id: &str) -> Result<PhaseState> {
        Ok(self.plan.read().phase(id)?.state)
    }

    /// Every recorded state change, oldest first.
    #[must_use]
    pub fn changelog(&self) -> Vec<PlanChange> {
        self.changelog.lock().clone()
    }

    /// Returns true if every phase has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.plan
            .read()
            .phases
            .iter()
            .all(|p| p.state == PhaseState::Completed)
    }

    /// Returns true if no phase holds applied changes.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.plan
            .read()
            .phases
            .iter()
            .all(|p| lifecycle::is_unapplied(p.state))
    }

    /// Pending phases whose dependencies completed and that nobody is
    /// working on, in plan order.
    #[must_use]
    pub fn runnable_phases(&self) -> Vec<String> {
        let runnable = self.plan.read().runnable_phases();
        let claims = self.claims.lock();
        runnable.into_iter().filter(|id| !claims.contains(id)).collect()
    }

    fn claim(&self, id: &str) -> Result<Claim<'_>> {
        if !self.claims.lock().insert(id.to_string()) {
            return Err(UpdateError::PhaseClaimed(id.to_string()));
        }
        Ok(Claim {
            claims: &self.claims,
            id: id.to_string(),
        })
    }

    fn transition(&self, id: &str, to: PhaseState, error: Option<String>) -> Result<()> {
        let now = Utc::now();
        let from = {
            let mut plan = self.plan.write();
            let phase = plan.phase_mut(id)?;
            let from = phase.state;
            lifecycle::validate_transition(id, from, to)?;
            phase.state = to;
            phase.updated_at = Some(now);
            phase.error.clone_from(&error);
            from
        };

        tracing::info!(phase = %id, %from, %to, "Phase state changed");

        self.changelog.lock().push(PlanChange {
            id: Uuid::new_v4(),
            phase_id: id.to_string(),
            from,
            to,
            created: now,
            error,
        });
        Ok(())
    }

    fn record_error(&self, id: &str, error: String) {
        if let Ok(phase) = self.plan.write().phase_mut(id) {
            phase.error = Some(error);
            phase.updated_at = Some(Utc::now());
        }
    }

    fn context(&self, id: &str) -> ExecutionContext {
        ExecutionContext::new(id, self.cancel.child_token(), self.config.node_parallelism)
    }

    /// Run `fut` under the phase timeout.
    ///
    /// On timeout the phase's token is cancelled and `fut` is still awaited
    /// to completion, so the caller keeps its claim until the executor has
    /// actually stopped.
    async fn with_timeout(
        &self,
        ctx: &ExecutionContext,
        fut: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        tokio::pin!(fut);
        if let Ok(result) = tokio::time::timeout(self.config.phase_timeout(), &mut fut).await {
            return result;
        }

        let seconds = self.config.phase_timeout_seconds;
        tracing::warn!(phase = %ctx.phase_id, seconds, "Phase timed out, waiting for it to stop");
        ctx.cancel.cancel();
        if let Err(e) = fut.await {
            tracing::debug!(phase = %ctx.phase_id, error = %e, "Timed out phase stopped");
        }
        Err(UpdateError::Timeout {
            phase: ctx.phase_id.clone(),
            seconds,
        })
    }

    /// Snapshot `id` for execution, enforcing dispatch and ordering rules.
    fn prepare_execute(&self, id: &str) -> Result<(Plan, Phase)> {
        let plan = self.plan.read();
        let phase = plan.phase(id)?;
        self.spec.check(&plan, phase)?;
        if !lifecycle::can_execute(phase.state) {
            return Err(UpdateError::InvalidTransition {
                phase: id.to_string(),
                from: phase.state,
                to: PhaseState::Running,
            });
        }
        let pending = plan.pending_dependencies(phase);
        if !pending.is_empty() {
            return Err(UpdateError::DependenciesNotMet {
                phase: id.to_string(),
                pending,
            });
        }
        Ok((plan.clone(), phase.clone()))
    }

    /// Execute one phase.
    ///
    /// Dispatch errors are reported before the phase changes state. Once the
    /// phase is running, any failure (executor construction included) leaves
    /// it `Failed` with the error recorded.
    ///
    /// # Errors
    ///
    /// Returns the dispatch, ordering or execution error.
    pub async fn execute_phase(&self, id: &str) -> Result<()> {
        let _claim = self.claim(id)?;
        let (plan, phase) = self.prepare_execute(id)?;

        self.transition(id, PhaseState::Running, None)?;

        let ctx = self.context(id);
        let result = match self
            .spec
            .executor(&ExecutorParams::new(&plan, &phase), self.remote.clone())
        {
            Ok(executor) => {
                tracing::info!(phase = %id, description = %executor.describe(), "Executing phase");
                self.with_timeout(&ctx, async {
                    executor.pre_check(&ctx).await?;
                    executor.execute(&ctx).await?;
                    executor.post_check(&ctx).await
                })
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.transition(id, PhaseState::Completed, None),
            Err(e) => {
                tracing::warn!(phase = %id, error = %e, "Phase failed");
                self.transition(id, PhaseState::Failed, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Execute every currently runnable phase concurrently.
    pub async fn step(&self) -> StepReport {
        let runnable = self.runnable_phases();
        let outcomes: Vec<(String, Result<()>)> = stream::iter(runnable)
            .map(|id| async move {
                let result = self.execute_phase(&id).await;
                (id, result)
            })
            .buffer_unordered(self.config.max_concurrent_phases)
            .collect()
            .await;

        let mut report = StepReport::default();
        for (id, result) in outcomes {
            match result {
                Ok(()) => report.completed.push(id),
                // Taken by a concurrent caller between listing and claiming.
                Err(UpdateError::PhaseClaimed(_)) => {}
                Err(e) => report.failed.push((id, e)),
            }
        }
        report
    }

    /// Run the plan until nothing more can run.
    ///
    /// Every phase is checked for dispatchability before anything executes,
    /// so a defective plan never partially runs.
    ///
    /// # Errors
    ///
    /// Returns the first plan-integrity error, `UpdateError::PhasesFailed` if
    /// phases failed, `UpdateError::Cancelled` if cancellation left the plan
    /// unfinished, or `UpdateError::Incomplete` if phases remain that can
    /// never run (rolled back, or left running by an interrupted engine).
    pub async fn run(&self) -> Result<()> {
        {
            let plan = self.plan.read();
            for phase in &plan.phases {
                self.spec.check(&plan, phase)?;
            }
        }

        tracing::info!(phases = self.plan.read().phases.len(), "Running plan");

        while !self.cancel.is_cancelled() {
            let report = self.step().await;
            if report.is_empty() {
                break;
            }
            tracing::debug!(
                completed = report.completed.len(),
                failed = report.failed.len(),
                "Step finished"
            );
        }

        self.outcome()
    }

    fn outcome(&self) -> Result<()> {
        let plan = self.plan.read();
        let failed = plan.phases_in(PhaseState::Failed);
        if !failed.is_empty() {
            return Err(UpdateError::PhasesFailed(failed));
        }
        let unfinished: Vec<String> = plan
            .phases
            .iter()
            .filter(|p| p.state != PhaseState::Completed)
            .map(|p| p.id.clone())
            .collect();
        if unfinished.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled {
                phase: unfinished[0].clone(),
            });
        }
        Err(UpdateError::Incomplete(unfinished))
    }

    /// Retry failed phases in dependency order, then continue the run.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::PhasesFailed` naming the phases that failed
    /// again, or any error from [`run`](Self::run).
    pub async fn resume(&self) -> Result<()> {
        let failed: Vec<String> = {
            let plan = self.plan.read();
            plan.topological_order()?
                .into_iter()
                .filter(|id| plan.phase(id).is_ok_and(|p| p.state == PhaseState::Failed))
                .collect()
        };

        tracing::info!(phases = ?failed, "Resuming failed phases");

        let mut still_failed = Vec::new();
        for id in failed {
            if self.execute_phase(&id).await.is_err() {
                still_failed.push(id);
            }
        }
        if !still_failed.is_empty() {
            return Err(UpdateError::PhasesFailed(still_failed));
        }

        self.run().await
    }

    fn prepare_rollback(&self, id: &str) -> Result<(Plan, Phase)> {
        let plan = self.plan.read();
        let phase = plan.phase(id)?;
        lifecycle::validate_transition(id, phase.state, PhaseState::RolledBack)?;
        let dependents: Vec<String> = plan
            .dependents(id)
            .filter(|d| !lifecycle::is_unapplied(d.state))
            .map(|d| d.id.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(UpdateError::DependentsNotRolledBack {
                phase: id.to_string(),
                dependents,
            });
        }
        Ok((plan.clone(), phase.clone()))
    }

    /// Roll back one completed or failed phase.
    ///
    /// A failed phase whose executor cannot be constructed never applied
    /// anything and is marked rolled back directly.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::DependentsNotRolledBack` if a dependent still
    /// holds applied changes, or the rollback error. A failed rollback leaves
    /// the state unchanged with the error recorded.
    pub async fn rollback_phase(&self, id: &str) -> Result<()> {
        let _claim = self.claim(id)?;
        let (plan, phase) = self.prepare_rollback(id)?;

        let executor = match self
            .spec
            .executor(&ExecutorParams::new(&plan, &phase), self.remote.clone())
        {
            Ok(executor) => executor,
            Err(e) if phase.state == PhaseState::Failed => {
                tracing::warn!(phase = %id, error = %e, "Nothing to roll back");
                return self.transition(id, PhaseState::RolledBack, None);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(phase = %id, description = %executor.describe(), "Rolling back phase");

        let ctx = self.context(id);
        match self.with_timeout(&ctx, executor.rollback(&ctx)).await {
            Ok(()) => self.transition(id, PhaseState::RolledBack, None),
            Err(e) => {
                tracing::warn!(phase = %id, error = %e, "Rollback failed");
                self.record_error(id, e.to_string());
                Err(e)
            }
        }
    }

    /// Roll back every completed or failed phase, dependents first.
    ///
    /// # Errors
    ///
    /// Stops at the first rollback error.
    pub async fn rollback_plan(&self) -> Result<()> {
        let order = self.plan.read().topological_order()?;
        for id in order.iter().rev() {
            if lifecycle::can_roll_back(self.phase_state(id)?) {
                self.rollback_phase(id).await?;
            }
        }
        tracing::info!("Plan rolled back");
        Ok(())
    }
}
