//! Configuration for connection managers and their database targets.

mod settings;
mod targets;

pub use settings::ManagerSettings;
pub use targets::{DatabaseTargets, TARGET_ENV_PREFIX};
