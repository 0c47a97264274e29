mod constants;
mod daemon;
mod discovery;
mod health;
mod learning;
mod logging;
mod persistence;
mod supervisor;
mod types;

pub use constants::*;
pub use daemon::{ConfigSummary, DaemonConfig};
pub use discovery::{DiscoveryConfig, WorkerTypeConfig};
pub use health::HealthConfig;
pub use learning::LearningConfig;
pub use logging::LoggingConfig;
pub use persistence::PersistenceConfig;
pub use supervisor::SupervisorSettings;
pub use types::*;
