//! Phase-based cluster update orchestration for shipyard.
//!
//! An update is described by a [`Plan`]: a set of phases with dependencies,
//! each naming the executor that performs it. This crate provides:
//!
//! - [`dispatch`]: the closed executor vocabulary and [`UpdateDispatcher`],
//!   which turns phases into [`PhaseExecutor`]s
//! - [`phases`]: the concrete executors
//! - [`engine`]: [`FsmEngine`], which runs, resumes and rolls back plans
//! - [`lifecycle`]: the phase state machine
//! - [`hooks`]: running package hooks on behalf of [`ClusterOperator`]s
//!
//! # Example
//!
//! ```no_run
//! # async fn example(
//! #     packages: std::sync::Arc<dyn shipyard_store::PackageService>,
//! #     cluster: std::sync::Arc<dyn shipyard_update::ClusterOperator>,
//! #     plan: shipyard_update::Plan,
//! # ) -> shipyard_update::Result<()> {
//! use shipyard_update::{FsmEngine, UpdateConfig, UpdateDispatcher};
//!
//! let engine = FsmEngine::new(
//!     UpdateDispatcher::new(packages, cluster),
//!     plan,
//!     UpdateConfig::from_env()?,
//! )?;
//! if let Err(e) = engine.run().await {
//!     tracing::warn!(error = %e, "Update failed, rolling back");
//!     engine.rollback_plan().await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod lifecycle;
pub mod phases;
pub mod plan;
pub mod types;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterAction, ClusterOperator};
pub use config::UpdateConfig;
pub use dispatch::{resolve_executor, ExecutorKind, UpdateDispatcher};
pub use engine::{FsmEngine, StepReport};
pub use error::{Result, UpdateError};
pub use executor::{ExecutionContext, ExecutorParams, FsmSpec, PhaseExecutor, Remote};
pub use hooks::PackageHooks;
pub use types::{
    ElectionChange, OperationType, Phase, PhaseData, PhaseState, Plan, PlanChange, Server,
};
