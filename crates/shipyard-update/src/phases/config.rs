//! `config`: materialize the runtime configuration package for a node.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::labels::purpose;
use shipyard_core::Locator;
use shipyard_pack::{config_labels, configure_package, node_config_labels};
use shipyard_store::PackageService;

use crate::error::Result;
use crate::executor::{ExecutionContext, ExecutorParams, PhaseExecutor};
use crate::types::Server;

/// Locator of the configuration package derived from `package` for `server`.
#[must_use]
pub fn config_locator(package: &Locator, server: Option<&Server>) -> Locator {
    let name = match server {
        Some(server) => format!("{}-config-{}", package.name, server.hostname),
        None => format!("{}-config", package.name),
    };
    Locator {
        repository: package.repository.clone(),
        name,
        version: package.version.clone(),
    }
}

/// Creates the configuration package of the phase's runtime package.
///
/// A phase targeting a server produces a per-node package labelled with the
/// node's hostname. Packages are immutable, so an existing configuration
/// package counts as done and rollback leaves it in place.
pub struct ConfigPhase {
    phase_id: String,
    package: Locator,
    config: Locator,
    node: Option<String>,
    args: Vec<String>,
    packages: Arc<dyn PackageService>,
}

impl ConfigPhase {
    /// Create the executor.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::InvalidPhaseData` if the phase names no package.
    pub fn new(params: &ExecutorParams<'_>, packages: Arc<dyn PackageService>) -> Result<Self> {
        let package = params.package()?.clone();
        let server = params.phase.data.server.as_ref();
        Ok(Self {
            phase_id: params.phase.id.clone(),
            config: config_locator(&package, server),
            node: server.map(|server| server.hostname.clone()),
            package,
            args: params.phase.data.args.clone(),
            packages,
        })
    }
}

#[async_trait]
impl PhaseExecutor for ConfigPhase {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.check_cancelled()?;
        match self.packages.read_package_envelope(&self.config) {
            Ok(_) => {
                tracing::info!(phase = %self.phase_id, config = %self.config, "Configuration package already exists");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let labels = match &self.node {
            Some(node) => node_config_labels(&self.package, purpose::RUNTIME_CONFIG, node),
            None => config_labels(&self.package, purpose::RUNTIME_CONFIG),
        };
        configure_package(&*self.packages, &self.package, &self.config, &self.args, &labels)?;
        Ok(())
    }

    async fn rollback(&self, _ctx: &ExecutionContext) -> Result<()> {
        tracing::debug!(phase = %self.phase_id, config = %self.config, "Configuration packages are kept on rollback");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Configure {}", self.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, plan_with, server};
    use crate::types::{Phase, PhaseData};
    use shipyard_core::{labels, Labels};
    use shipyard_pack::test_utils::{app_manifest, create_package};
    use shipyard_pack::{find_config_package, find_node_config_package, read_config_package};
    use shipyard_store::MemoryPackageStore;

    #[tokio::test]
    async fn creates_node_config_once() {
        let store = Arc::new(MemoryPackageStore::new());
        create_package(&*store, "sys/runtime:2.0.0", &app_manifest(), Labels::new()).unwrap();
        let phase = Phase::new("/masters/node-1/config", "config").with_data(PhaseData {
            server: Some(server("node-1")),
            package: Some("sys/runtime:2.0.0".parse().unwrap()),
            args: vec!["--domain".into(), "cluster.local".into()],
            ..PhaseData::default()
        });
        let plan = plan_with(vec![phase.clone()]);
        let executor = ConfigPhase::new(&ExecutorParams::new(&plan, &phase), store.clone()).unwrap();

        executor.execute(&ctx(&phase.id)).await.unwrap();
        executor.execute(&ctx(&phase.id)).await.unwrap();
        assert_eq!(store.len(), 2);

        let conf =
            find_node_config_package(&*store, &"sys/runtime:2.0.0".parse().unwrap(), "node-1").unwrap();
        assert_eq!(conf.to_string(), "sys/runtime-config-node-1:2.0.0");
        let envelope = store.read_package_envelope(&conf).unwrap();
        assert!(envelope.has_label(labels::PURPOSE, purpose::RUNTIME_CONFIG));
        assert!(envelope.has_label(labels::NODE, "node-1"));

        let (_, reader) = store.read_package(&conf).unwrap();
        let vars = read_config_package(reader).unwrap();
        assert_eq!(vars.get("DOMAIN").map(String::as_str), Some("cluster.local"));
    }

    #[tokio::test]
    async fn each_node_gets_its_own_config() {
        let store = Arc::new(MemoryPackageStore::new());
        create_package(&*store, "sys/runtime:2.0.0", &app_manifest(), Labels::new()).unwrap();
        let phases: Vec<Phase> = [("node-1", "one.local"), ("node-2", "two.local")]
            .into_iter()
            .map(|(node, domain)| {
                Phase::new(format!("/masters/{node}/config"), "config").with_data(PhaseData {
                    server: Some(server(node)),
                    package: Some("sys/runtime:2.0.0".parse().unwrap()),
                    args: vec!["--domain".into(), domain.into()],
                    ..PhaseData::default()
                })
            })
            .collect();
        let plan = plan_with(phases.clone());
        for phase in &phases {
            let executor = ConfigPhase::new(&ExecutorParams::new(&plan, phase), store.clone()).unwrap();
            executor.execute(&ctx(&phase.id)).await.unwrap();
        }

        let runtime: Locator = "sys/runtime:2.0.0".parse().unwrap();
        for (node, domain) in [("node-1", "one.local"), ("node-2", "two.local")] {
            let conf = find_node_config_package(&*store, &runtime, node).unwrap();
            assert_eq!(conf.to_string(), format!("sys/runtime-config-{node}:2.0.0"));
            let (_, reader) = store.read_package(&conf).unwrap();
            let vars = read_config_package(reader).unwrap();
            assert_eq!(vars.get("DOMAIN").map(String::as_str), Some(domain));
        }
        assert!(find_config_package(&*store, &runtime).unwrap_err().is_not_found());
    }

    #[test]
    fn config_locator_naming() {
        let loc: Locator = "sys/runtime:2.0.0".parse().unwrap();
        assert_eq!(config_locator(&loc, None).to_string(), "sys/runtime-config:2.0.0");
    }
}
