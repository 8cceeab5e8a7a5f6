//! Error types for update orchestration.
//!
//! Dispatch and plan-structure errors are plan-integrity failures: they are
//! fatal to a run and never lead to partial dispatch.

use shipyard_pack::PackError;
use shipyard_store::StoreError;
use thiserror::Error;

use crate::types::{OperationType, PhaseState};

/// A result type using `UpdateError`.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors that can occur while dispatching and running plan phases.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The phase does not declare an executor.
    #[error("error in plan, executor for phase {phase:?} was not specified")]
    MissingExecutor {
        /// Phase ID.
        phase: String,
    },

    /// The plan's operation is not the one this dispatch table serves.
    #[error("unsupported operation {actual}, expected {expected}")]
    UnsupportedOperation {
        /// Operation the dispatch table serves.
        expected: OperationType,
        /// Operation declared by the plan.
        actual: OperationType,
    },

    /// The executor name is outside the known vocabulary.
    #[error("phase {phase:?} requires executor {executor:?} (potential mismatch between upgrade versions)")]
    UnknownExecutor {
        /// Phase ID.
        phase: String,
        /// Declared executor name.
        executor: String,
    },

    /// The phase lacks data its executor needs.
    #[error("phase {phase:?}: {reason}")]
    InvalidPhaseData {
        /// Phase ID.
        phase: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// No phase with this ID exists in the plan.
    #[error("phase not found: {0}")]
    PhaseNotFound(String),

    /// Two phases share an ID.
    #[error("duplicate phase ID {0:?}")]
    DuplicatePhase(String),

    /// A phase depends on a phase that is not in the plan.
    #[error("phase {phase:?} requires unknown phase {dependency:?}")]
    UnknownDependency {
        /// Phase ID.
        phase: String,
        /// Missing dependency.
        dependency: String,
    },

    /// Phase dependencies form a cycle.
    #[error("dependency cycle between phases {0:?}")]
    DependencyCycle(Vec<String>),

    /// The requested state change is not allowed.
    #[error("invalid transition for phase {phase:?}: cannot transition from {from} to {to}")]
    InvalidTransition {
        /// Phase ID.
        phase: String,
        /// Current state.
        from: PhaseState,
        /// Requested state.
        to: PhaseState,
    },

    /// Some dependencies have not completed.
    #[error("phase {phase:?} is waiting for {pending:?}")]
    DependenciesNotMet {
        /// Phase ID.
        phase: String,
        /// Dependencies that have not completed.
        pending: Vec<String>,
    },

    /// Some dependents still hold applied changes.
    #[error("phase {phase:?} cannot be rolled back before {dependents:?}")]
    DependentsNotRolledBack {
        /// Phase ID.
        phase: String,
        /// Dependents that must be rolled back first.
        dependents: Vec<String>,
    },

    /// Another execution path is working on the phase.
    #[error("phase {0:?} is already being executed")]
    PhaseClaimed(String),

    /// The phase was cancelled between sub-operations.
    #[error("phase {phase:?} was cancelled")]
    Cancelled {
        /// Phase ID.
        phase: String,
    },

    /// The phase did not finish within the configured timeout.
    #[error("phase {phase:?} timed out after {seconds}s")]
    Timeout {
        /// Phase ID.
        phase: String,
        /// Configured timeout.
        seconds: u64,
    },

    /// A run ended with failed phases.
    #[error("phases failed: {0:?}")]
    PhasesFailed(Vec<String>),

    /// A run ended with phases that can no longer run.
    #[error("plan cannot finish, unfinished phases: {0:?}")]
    Incomplete(Vec<String>),

    /// A cluster action failed.
    #[error("cluster operation failed: {0}")]
    Cluster(String),

    /// A node-level call failed.
    #[error("remote execution on {server} failed: {reason}")]
    Remote {
        /// Target server.
        server: String,
        /// Failure description.
        reason: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Package resolution or configuration error.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl UpdateError {
    /// Returns true if the plan itself is defective.
    #[must_use]
    pub const fn is_plan_integrity(&self) -> bool {
        matches!(
            self,
            Self::MissingExecutor { .. }
                | Self::UnsupportedOperation { .. }
                | Self::UnknownExecutor { .. }
                | Self::InvalidPhaseData { .. }
                | Self::DuplicatePhase(_)
                | Self::UnknownDependency { .. }
                | Self::DependencyCycle(_)
        )
    }

    /// Returns true if something looked up does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::PhaseNotFound(_) => true,
            Self::Pack(e) => e.is_not_found(),
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if retrying the phase later might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::PhaseClaimed(_)
                | Self::Cancelled { .. }
                | Self::Timeout { .. }
                | Self::Cluster(_)
                | Self::Remote { .. }
        )
    }
}
