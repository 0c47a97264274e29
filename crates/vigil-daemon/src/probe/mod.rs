mod prober;
mod sources;
mod system;
mod window;

pub use prober::{HealthProber, ProberStats};
pub use sources::{FileHeartbeat, FileQueueInspector};
pub use system::SystemProbe;
pub use window::SampleWindow;

use async_trait::async_trait;
use vigil_types::{HealthSample, VigilResult, WorkerDescriptor, WorkerId, WorkerType};

/// Produces one health sample for a worker. Callers bound every call with a
/// timeout, so implementations may block on slow I/O.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, descriptor: &WorkerDescriptor) -> VigilResult<HealthSample>;
}

#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    /// Seconds since the worker's last heartbeat, `None` if it never sent one.
    async fn heartbeat_age(&self, worker_id: &WorkerId) -> Option<f64>;
}

#[async_trait]
pub trait QueueInspector: Send + Sync {
    async fn backlog(&self, worker_type: &WorkerType) -> VigilResult<u64>;
}
