//! Phase executor contract.
//!
//! A [`FsmSpec`] turns a plan phase into a [`PhaseExecutor`]. Executors that
//! act on a node from a coordinating process do so through [`Remote`].

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::Locator;
use shipyard_store::PackageUpdate;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UpdateError};
use crate::types::{Phase, Plan, Server};

/// The strategy object that performs one phase and can undo it.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    /// Apply the phase.
    ///
    /// Implementations check `ctx` for cancellation between node-level
    /// sub-operations and leave the cluster recoverable when they stop early.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Undo the phase.
    async fn rollback(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Human-readable summary of what the phase does.
    fn describe(&self) -> String;

    /// Verify preconditions before [`execute`](Self::execute).
    async fn pre_check(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Verify the outcome after [`execute`](Self::execute).
    async fn post_check(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }
}

/// Node-level execution from a coordinating process.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Verify that `server` is healthy and ready for the update.
    async fn check_server(&self, server: &Server) -> Result<()>;

    /// Run the node-local part of `phase_id` on `server`.
    async fn execute_phase(&self, server: &Server, phase_id: &str) -> Result<()>;

    /// Undo the node-local part of `phase_id` on `server`.
    async fn rollback_phase(&self, server: &Server, phase_id: &str) -> Result<()>;
}

/// Maps plan phases to executors.
pub trait FsmSpec: Send + Sync {
    /// Check that `phase` can be dispatched, without constructing anything.
    ///
    /// # Errors
    ///
    /// Returns a plan-integrity error if the phase is not dispatchable.
    fn check(&self, plan: &Plan, phase: &Phase) -> Result<()>;

    /// Construct the executor for `params.phase`.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error, or the executor's construction error.
    fn executor(
        &self,
        params: &ExecutorParams<'_>,
        remote: Option<Arc<dyn Remote>>,
    ) -> Result<Box<dyn PhaseExecutor>>;
}

/// What an executor is constructed from.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorParams<'a> {
    /// The whole plan.
    pub plan: &'a Plan,
    /// The phase being dispatched.
    pub phase: &'a Phase,
}

impl<'a> ExecutorParams<'a> {
    /// Create params for one phase of `plan`.
    #[must_use]
    pub const fn new(plan: &'a Plan, phase: &'a Phase) -> Self {
        Self { plan, phase }
    }

    fn missing(&self, what: &str) -> UpdateError {
        UpdateError::InvalidPhaseData {
            phase: self.phase.id.clone(),
            reason: format!("{} requires {what}", self.phase.executor),
        }
    }

    /// The node the phase targets.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase names no server.
    pub fn server(&self) -> Result<&'a Server> {
        self.phase.data.server.as_ref().ok_or_else(|| self.missing("a server"))
    }

    /// The package the phase works with.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase names no package.
    pub fn package(&self) -> Result<&'a Locator> {
        self.phase.data.package.as_ref().ok_or_else(|| self.missing("a package"))
    }

    /// The package update the phase applies.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase carries no update.
    pub fn update(&self) -> Result<&'a PackageUpdate> {
        self.phase.data.update.as_ref().ok_or_else(|| self.missing("a package update"))
    }

    /// The remote execution handle.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if none was supplied.
    pub fn require_remote(&self, remote: Option<Arc<dyn Remote>>) -> Result<Arc<dyn Remote>> {
        remote.ok_or_else(|| self.missing("a remote execution handle"))
    }
}

/// Per-execution context handed to executors.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Phase being executed.
    pub phase_id: String,
    /// Cancellation signal.
    pub cancel: CancellationToken,
    /// Maximum concurrent node-level operations.
    pub node_parallelism: usize,
}

impl ExecutionContext {
    /// Create a context for `phase_id`.
    #[must_use]
    pub fn new(phase_id: impl Into<String>, cancel: CancellationToken, node_parallelism: usize) -> Self {
        Self {
            phase_id: phase_id.into(),
            cancel,
            node_parallelism: node_parallelism.max(1),
        }
    }

    /// Fail with `UpdateError::Cancelled` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Cancelled` once the token is cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled {
                phase: self.phase_id.clone(),
            });
        }
        Ok(())
    }
}
