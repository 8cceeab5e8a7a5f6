//! End-to-end update runs against an in-memory package store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard_core::{labels, Labels, Locator};
use shipyard_pack::test_utils::{app_manifest, create_package, RecordingRunner};
use shipyard_pack::{find_installed_package, find_node_config_package, CommandSpec, Manifest};
use shipyard_store::{MemoryPackageStore, PackageService, PackageUpdate};
use shipyard_update::{
    ClusterAction, ClusterOperator, FsmEngine, OperationType, PackageHooks, Phase, PhaseData,
    PhaseState, Plan, Remote, Result, Server, UpdateConfig, UpdateDispatcher, UpdateError,
};
use tempfile::TempDir;

#[derive(Default)]
struct Journal {
    actions: Mutex<Vec<ClusterAction>>,
}

#[async_trait]
impl ClusterOperator for Journal {
    async fn apply(&self, action: &ClusterAction) -> Result<()> {
        self.actions.lock().push(action.clone());
        Ok(())
    }
}

#[derive(Default)]
struct Agents {
    checked: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Remote for Agents {
    async fn check_server(&self, server: &Server) -> Result<()> {
        self.checked.lock().push(server.hostname.clone());
        Ok(())
    }

    async fn execute_phase(&self, server: &Server, phase_id: &str) -> Result<()> {
        self.calls.lock().push(format!("execute {} {phase_id}", server.hostname));
        Ok(())
    }

    async fn rollback_phase(&self, server: &Server, phase_id: &str) -> Result<()> {
        self.calls.lock().push(format!("rollback {} {phase_id}", server.hostname));
        Ok(())
    }
}

fn loc(s: &str) -> Locator {
    s.parse().unwrap()
}

fn web_manifest() -> Manifest {
    let hook = |script: &str| CommandSpec {
        args: vec!["/bin/sh".to_string(), script.to_string()],
    };
    Manifest {
        config: None,
        commands: [
            ("update".to_string(), hook("update.sh")),
            ("rollback".to_string(), hook("rollback.sh")),
        ]
        .into(),
    }
}

fn server(hostname: &str, master: bool) -> Server {
    Server {
        hostname: hostname.to_string(),
        advertise_ip: "10.0.0.1".to_string(),
        master,
    }
}

fn update_plan(from: &str) -> Plan {
    let node = server("node-1", true);
    let on_node = |data: PhaseData| PhaseData {
        server: Some(node.clone()),
        ..data
    };
    let update = PhaseData {
        update: Some(PackageUpdate {
            from: loc(from),
            to: loc("app/web:1.2.0"),
        }),
        ..PhaseData::default()
    };

    Plan {
        operation_id: "op-42".to_string(),
        operation_type: OperationType::Update,
        cluster_name: "prod".to_string(),
        servers: vec![node.clone(), server("node-2", false)],
        phases: vec![
            Phase::new("/init", "update_init").with_data(update.clone()),
            Phase::new("/checks", "update_checks").after("/init"),
            Phase::new("/masters/node-1/drain", "drain_node")
                .after("/checks")
                .with_data(on_node(PhaseData::default())),
            Phase::new("/masters/node-1/system", "update_system")
                .after("/masters/node-1/drain")
                .with_data(on_node(PhaseData::default())),
            Phase::new("/masters/node-1/config", "config")
                .after("/masters/node-1/drain")
                .with_data(on_node(PhaseData {
                    package: Some(loc("sys/runtime:2.0.0")),
                    args: vec!["--domain=cluster.local".to_string()],
                    ..PhaseData::default()
                })),
            Phase::new("/masters/node-1/uncordon", "uncordon_node")
                .after("/masters/node-1/system")
                .after("/masters/node-1/config")
                .with_data(on_node(PhaseData::default())),
            Phase::new("/app", "update_app")
                .after("/masters/node-1/uncordon")
                .with_data(update),
        ],
    }
}

struct Cluster {
    store: Arc<MemoryPackageStore>,
    journal: Arc<Journal>,
    agents: Arc<Agents>,
    runner: Arc<RecordingRunner>,
    dir: TempDir,
}

impl Cluster {
    fn new(installed: &str) -> Self {
        let store = Arc::new(MemoryPackageStore::new());
        for version in ["app/web:1.0.0", "app/web:1.1.0", "app/web:1.2.0"] {
            let labels = if version == installed {
                labels::installed()
            } else {
                Labels::new()
            };
            create_package(&*store, version, &web_manifest(), labels).unwrap();
        }
        create_package(&*store, "sys/runtime:2.0.0", &app_manifest(), Labels::new()).unwrap();

        Self {
            store,
            journal: Arc::new(Journal::default()),
            agents: Arc::new(Agents::default()),
            runner: Arc::new(RecordingRunner::new(b"ok\n".to_vec())),
            dir: TempDir::new().unwrap(),
        }
    }

    fn engine(&self, plan: Plan) -> FsmEngine<UpdateDispatcher> {
        let packages: Arc<dyn PackageService> = self.store.clone();
        let hooks = PackageHooks::new(
            Arc::clone(&packages),
            self.runner.clone(),
            self.dir.path(),
            self.journal.clone(),
        );
        let config = UpdateConfig {
            storage_dir: self.dir.path().to_path_buf(),
            ..UpdateConfig::default()
        };
        FsmEngine::new(UpdateDispatcher::new(packages, Arc::new(hooks)), plan, config)
            .unwrap()
            .with_remote(self.agents.clone())
    }

    fn installed_version(&self) -> String {
        find_installed_package(&*self.store, &loc("app/web:0.0.0"))
            .unwrap()
            .version
    }

    fn hooks_run(&self) -> Vec<String> {
        self.runner
            .invocations()
            .into_iter()
            .map(|i| format!("{} in {}", i.args[1], i.dir.strip_prefix(self.dir.path()).unwrap().display()))
            .collect()
    }
}

#[tokio::test]
async fn update_and_roll_back() {
    let cluster = Cluster::new("app/web:1.0.0");
    let engine = cluster.engine(update_plan("app/web:1.0.0"));

    engine.run().await.unwrap();

    assert!(engine.is_complete());
    assert_eq!(engine.changelog().len(), 14);
    assert_eq!(cluster.installed_version(), "1.2.0");
    assert_eq!(
        find_node_config_package(&*cluster.store, &loc("sys/runtime:2.0.0"), "node-1").unwrap(),
        loc("sys/runtime-config-node-1:2.0.0")
    );
    assert_eq!(cluster.hooks_run(), vec!["update.sh in app/web/1.2.0"]);
    assert_eq!(
        *cluster.journal.actions.lock(),
        vec![
            ClusterAction::Drain { node: "node-1".into() },
            ClusterAction::Uncordon { node: "node-1".into() },
        ]
    );
    let mut checked = cluster.agents.checked.lock().clone();
    checked.sort();
    assert_eq!(checked, vec!["node-1", "node-2"]);
    assert_eq!(
        *cluster.agents.calls.lock(),
        vec!["execute node-1 /masters/node-1/system"]
    );

    engine.rollback_plan().await.unwrap();

    assert!(engine.is_rolled_back());
    assert_eq!(cluster.installed_version(), "1.0.0");
    assert_eq!(
        cluster.hooks_run(),
        vec!["update.sh in app/web/1.2.0", "rollback.sh in app/web/1.0.0"]
    );
    assert_eq!(
        cluster.journal.actions.lock().last(),
        Some(&ClusterAction::Uncordon { node: "node-1".into() })
    );
    assert_eq!(
        *cluster.agents.calls.lock(),
        vec![
            "execute node-1 /masters/node-1/system",
            "rollback node-1 /masters/node-1/system",
        ]
    );
    // The configuration package is immutable and survives the rollback.
    assert!(find_node_config_package(&*cluster.store, &loc("sys/runtime:2.0.0"), "node-1").is_ok());
}

#[tokio::test]
async fn stale_plan_stops_at_init() {
    let cluster = Cluster::new("app/web:1.1.0");
    let engine = cluster.engine(update_plan("app/web:1.0.0"));

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, UpdateError::PhasesFailed(ref ids) if ids == &["/init"]));
    assert_eq!(engine.phase_state("/checks").unwrap(), PhaseState::Pending);
    assert!(cluster.agents.checked.lock().is_empty());
    assert_eq!(cluster.installed_version(), "1.1.0");

    engine.rollback_plan().await.unwrap();
    assert!(engine.is_rolled_back());
}

#[tokio::test]
async fn unknown_executor_rejects_whole_plan() {
    let cluster = Cluster::new("app/web:1.0.0");
    let mut plan = update_plan("app/web:1.0.0");
    plan.phases
        .push(Phase::new("/masters/node-1/frobnicate", "frobnicate").after("/app"));
    let engine = cluster.engine(plan);

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, UpdateError::UnknownExecutor { ref executor, .. } if executor == "frobnicate"));
    assert!(engine.changelog().is_empty());
    assert!(cluster.journal.actions.lock().is_empty());
    assert_eq!(cluster.installed_version(), "1.0.0");
}

#[tokio::test]
async fn plan_survives_json_round_trip_mid_run() {
    let cluster = Cluster::new("app/web:1.0.0");
    let engine = cluster.engine(update_plan("app/web:1.0.0"));
    engine.step().await;

    let saved = serde_json::to_string(&engine.plan()).unwrap();
    let restored: Plan = serde_json::from_str(&saved).unwrap();
    assert_eq!(restored.phase("/init").unwrap().state, PhaseState::Completed);

    let resumed = cluster.engine(restored);
    assert_eq!(resumed.runnable_phases(), vec!["/checks"]);
    resumed.run().await.unwrap();
    assert_eq!(cluster.installed_version(), "1.2.0");
}
