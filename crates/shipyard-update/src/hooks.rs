//! Package hooks as cluster actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::Locator;
use shipyard_pack::{execute_package_command, find_config_package, package_manifest, CommandRunner};
use shipyard_store::PackageService;

use crate::cluster::{ClusterAction, ClusterOperator};
use crate::error::{Result, UpdateError};

/// Runs [`ClusterAction::RunHook`] as the package's manifest command of the
/// same name and hands every other action to an inner operator.
///
/// Packages that do not declare the hook skip it. The hook sees the bindings
/// of the package's configuration package, if one exists.
pub struct PackageHooks {
    packages: Arc<dyn PackageService>,
    runner: Arc<dyn CommandRunner>,
    storage_dir: PathBuf,
    inner: Arc<dyn ClusterOperator>,
}

impl PackageHooks {
    /// Create the operator. Packages are unpacked under `storage_dir`.
    #[must_use]
    pub fn new(
        packages: Arc<dyn PackageService>,
        runner: Arc<dyn CommandRunner>,
        storage_dir: impl Into<PathBuf>,
        inner: Arc<dyn ClusterOperator>,
    ) -> Self {
        Self {
            packages,
            runner,
            storage_dir: storage_dir.into(),
            inner,
        }
    }
}

fn run_hook(
    packages: &dyn PackageService,
    runner: &dyn CommandRunner,
    storage_dir: &Path,
    package: &Locator,
    hook: &str,
) -> Result<()> {
    match package_manifest(packages, package)?.command(hook) {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            tracing::debug!(package = %package, hook, "Package declares no such hook");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let config = match find_config_package(packages, package) {
        Ok(config) => Some(config),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let output = execute_package_command(
        packages,
        runner,
        hook,
        package,
        config.as_ref(),
        &[],
        storage_dir,
    )?;
    tracing::debug!(
        package = %package,
        hook,
        output = %String::from_utf8_lossy(&output),
        "Hook finished"
    );
    Ok(())
}

#[async_trait]
impl ClusterOperator for PackageHooks {
    async fn apply(&self, action: &ClusterAction) -> Result<()> {
        let ClusterAction::RunHook { package, hook } = action else {
            return self.inner.apply(action).await;
        };

        let context = format!("hook {hook} of {package}");
        let packages = Arc::clone(&self.packages);
        let runner = Arc::clone(&self.runner);
        let storage_dir = self.storage_dir.clone();
        let package = package.clone();
        let hook = hook.clone();

        tokio::task::spawn_blocking(move || {
            run_hook(&*packages, &*runner, &storage_dir, &package, &hook)
        })
        .await
        .map_err(|e| UpdateError::Cluster(format!("{context} did not finish: {e}")))?
    }
}
