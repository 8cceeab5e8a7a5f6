//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard_core::{Labels, Locator};
use shipyard_store::{CreateOptions, MemoryPackageStore, PackageService, PackageUpdate};
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterAction, ClusterOperator};
use crate::dispatch::resolve_executor;
use crate::error::{Result, UpdateError};
use crate::executor::{ExecutionContext, ExecutorParams, FsmSpec, PhaseExecutor, Remote};
use crate::types::{OperationType, Phase, PhaseData, Plan, Server};

pub(crate) fn ctx(phase_id: &str) -> ExecutionContext {
    ExecutionContext::new(phase_id, CancellationToken::new(), 2)
}

pub(crate) fn memory_store(packages: &[(&str, Labels)]) -> Arc<dyn PackageService> {
    let store = MemoryPackageStore::new();
    for (loc, labels) in packages {
        let loc: Locator = loc.parse().unwrap();
        store
            .create_package(&loc, &mut &b"x"[..], CreateOptions::with_labels(labels.clone()))
            .unwrap();
    }
    Arc::new(store)
}

pub(crate) fn plan_with(phases: Vec<Phase>) -> Plan {
    Plan {
        operation_id: "op-1".into(),
        operation_type: OperationType::Update,
        cluster_name: "test-cluster".into(),
        servers: vec![],
        phases,
    }
}

pub(crate) fn server(hostname: &str) -> Server {
    Server {
        hostname: hostname.into(),
        advertise_ip: "10.0.0.1".into(),
        master: true,
    }
}

pub(crate) fn update_phase(id: &str, executor: &str, from: &str, to: &str) -> Phase {
    Phase::new(id, executor).with_data(PhaseData {
        update: Some(PackageUpdate {
            from: from.parse().unwrap(),
            to: to.parse().unwrap(),
        }),
        ..PhaseData::default()
    })
}

/// Records applied cluster actions.
#[derive(Default)]
pub(crate) struct RecordingCluster {
    applied: Mutex<Vec<ClusterAction>>,
    fail: bool,
}

impl RecordingCluster {
    pub(crate) fn failing() -> Self {
        Self {
            applied: Mutex::default(),
            fail: true,
        }
    }

    pub(crate) fn applied(&self) -> Vec<ClusterAction> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl ClusterOperator for RecordingCluster {
    async fn apply(&self, action: &ClusterAction) -> Result<()> {
        if self.fail {
            return Err(UpdateError::Cluster(format!("{action:?} refused")));
        }
        self.applied.lock().push(action.clone());
        Ok(())
    }
}

/// Records node-level calls, optionally failing on one host.
#[derive(Default)]
pub(crate) struct FakeRemote {
    fail_on: Option<String>,
    checked: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub(crate) fn failing_on(hostname: &str) -> Self {
        Self {
            fail_on: Some(hostname.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn checked(&self) -> Vec<String> {
        self.checked.lock().clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn outcome(&self, server: &Server) -> Result<()> {
        if self.fail_on.as_deref() == Some(server.hostname.as_str()) {
            return Err(UpdateError::Remote {
                server: server.hostname.clone(),
                reason: "agent unreachable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn check_server(&self, server: &Server) -> Result<()> {
        self.checked.lock().push(server.hostname.clone());
        self.outcome(server)
    }

    async fn execute_phase(&self, server: &Server, phase_id: &str) -> Result<()> {
        self.outcome(server)?;
        self.calls
            .lock()
            .push(format!("execute {} {phase_id}", server.hostname));
        Ok(())
    }

    async fn rollback_phase(&self, server: &Server, phase_id: &str) -> Result<()> {
        self.outcome(server)?;
        self.calls
            .lock()
            .push(format!("rollback {} {phase_id}", server.hostname));
        Ok(())
    }
}

/// How a scripted phase behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    /// Executor construction fails.
    BrokenConstruction,
    /// `execute` fails.
    FailExecute,
    /// `rollback` fails.
    FailRollback,
    /// `execute` waits for cancellation.
    Hang,
    /// `execute` runs blocking work that ignores cancellation, then journals
    /// `finished /id`.
    Blocking,
}

/// An executor table driven by per-phase scripts.
///
/// Phases without a script succeed. Every call is appended to the journal as
/// `execute /id` or `rollback /id`.
#[derive(Default, Clone)]
pub(crate) struct ScriptedSpec {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSpec {
    pub(crate) fn script(&self, phase_id: &str, script: Script) {
        self.scripts.lock().insert(phase_id.to_string(), script);
    }

    pub(crate) fn clear(&self, phase_id: &str) {
        self.scripts.lock().remove(phase_id);
    }

    pub(crate) fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }
}

impl FsmSpec for ScriptedSpec {
    fn check(&self, plan: &Plan, phase: &Phase) -> Result<()> {
        resolve_executor(OperationType::Update, plan, phase).map(|_| ())
    }

    fn executor(
        &self,
        params: &ExecutorParams<'_>,
        _remote: Option<Arc<dyn Remote>>,
    ) -> Result<Box<dyn PhaseExecutor>> {
        let id = params.phase.id.clone();
        let script = self.scripts.lock().get(&id).copied();
        if script == Some(Script::BrokenConstruction) {
            return Err(UpdateError::InvalidPhaseData {
                phase: id,
                reason: "scripted construction failure".into(),
            });
        }
        Ok(Box::new(ScriptedPhase {
            id,
            script,
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct ScriptedPhase {
    id: String,
    script: Option<Script>,
    journal: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PhaseExecutor for ScriptedPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        self.journal.lock().push(format!("execute {}", self.id));
        match self.script {
            Some(Script::FailExecute) => Err(UpdateError::Cluster(format!("{} failed", self.id))),
            Some(Script::Hang) => {
                ctx.cancel.cancelled().await;
                ctx.check_cancelled()
            }
            Some(Script::Blocking) => {
                let journal = Arc::clone(&self.journal);
                let id = self.id.clone();
                tokio::task::spawn_blocking(move || {
                    std::thread::sleep(std::time::Duration::from_millis(1500));
                    journal.lock().push(format!("finished {id}"));
                })
                .await
                .map_err(|e| UpdateError::Cluster(e.to_string()))?;
                ctx.check_cancelled()
            }
            _ => Ok(()),
        }
    }

    async fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.journal.lock().push(format!("rollback {}", self.id));
        if self.script == Some(Script::FailRollback) {
            return Err(UpdateError::Cluster(format!("{} rollback failed", self.id)));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Scripted phase {}", self.id)
    }
}
