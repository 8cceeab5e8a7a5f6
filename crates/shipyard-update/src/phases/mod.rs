//! Concrete phase executors.

mod actions;
mod app;
mod checks;
mod config;
mod init;
mod node;

pub use actions::ActionPhase;
pub use app::AppPhase;
pub use checks::ChecksPhase;
pub use config::{config_locator, ConfigPhase};
pub use init::InitPhase;
pub use node::NodePhase;
