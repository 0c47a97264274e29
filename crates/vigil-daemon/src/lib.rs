#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod config;
pub mod probe;
pub mod profile;
pub mod recovery;
pub mod registry;
pub mod storage;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use classify::{classify, FailureClassifier};
pub use config::{
    ConfigSummary, DaemonConfig, DiscoveryConfig, DiscoveryMode, HealthConfig, LearningConfig, LogLevel,
    LoggingConfig, PersistenceConfig, SupervisorSettings, WorkerTypeConfig,
};
pub use probe::{
    FileHeartbeat, FileQueueInspector, HealthProbe, HealthProber, HeartbeatSource, QueueInspector, SampleWindow,
    SystemProbe,
};
pub use profile::{
    Journal, MemoryPersistence, PersistenceWriter, ProfilePersistence, ProfileRow, ProfileSnapshot, ProfileStore,
    WriteStatus,
};
pub use recovery::{
    ChannelIncidentSink, IncidentChannel, LocalProcessController, LogIncidentChannel, ProcessController,
    ProcessScaler, RecoveryActions, RecoveryExecutor, Scaler, StrategySelector,
};
pub use registry::{DiscoverySource, ProcessScanDiscovery, RegistryDelta, RosterDiscovery, WorkerRegistry};
pub use storage::{StorageConfig, SupervisorStorage};
pub use supervisor::{
    CancelHandle, CancellationToken, ResetInbox, ShutdownReport, StatusCounts, StatusDigest, Supervisor,
    SupervisorParts, SupervisorStats, TickReport, WorkerStateTable,
};
