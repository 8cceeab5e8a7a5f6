//! Shipyard plan checker.
//!
//! Loads an update plan, verifies that this build can execute every phase of
//! it and reports what would run first. Optionally reports whether a newer
//! version of a package is available in the local package store.

use shipyard_core::Locator;
use shipyard_pack::find_package_update;
use shipyard_store::{PackageService, RocksPackageStore};
use shipyard_update::{resolve_executor, OperationType, Plan, UpdateConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn check_plan(plan: &Plan) -> Result<(), Box<dyn std::error::Error>> {
    plan.validate()?;
    for phase in &plan.phases {
        let kind = resolve_executor(OperationType::Update, plan, phase)?;
        tracing::debug!(phase = %phase.id, executor = %kind, "Phase dispatchable");
    }
    Ok(())
}

fn check_package(service: &dyn PackageService, loc: &Locator) -> Result<(), Box<dyn std::error::Error>> {
    match find_package_update(service, loc) {
        Ok(update) => tracing::info!(%update, "Update available"),
        Err(e) if e.is_not_found() => tracing::info!(package = %loc, "Package is up to date"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shipyard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = UpdateConfig::from_env()?;
    let plan_path = std::env::var("SHIPYARD_PLAN_PATH")
        .map_err(|_| "SHIPYARD_PLAN_PATH must point at a plan file")?;

    let plan: Plan = serde_json::from_slice(&std::fs::read(&plan_path)?)?;
    tracing::info!(
        plan_path = %plan_path,
        operation_id = %plan.operation_id,
        cluster = %plan.cluster_name,
        phases = plan.phases.len(),
        "Loaded plan"
    );

    check_plan(&plan)?;

    let runnable = plan.runnable_phases();
    tracing::info!(runnable = ?runnable, "Plan is valid");

    if let Ok(package) = std::env::var("SHIPYARD_CHECK_PACKAGE") {
        let loc: Locator = package.parse()?;
        let store = RocksPackageStore::open(&config.data_dir)?;
        tracing::info!(data_dir = %config.data_dir.display(), "Opened package store");
        check_package(&store, &loc)?;
    }

    Ok(())
}
