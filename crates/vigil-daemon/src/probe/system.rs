use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Pid, System};
use tracing::debug;
use vigil_types::{HealthSample, ProcessHandle, VigilError, VigilResult, WorkerDescriptor};

use super::{HealthProbe, HeartbeatSource, QueueInspector};

/// Liveness and resource usage from the local process table, optionally
/// combined with a heartbeat source and a queue inspector.
pub struct SystemProbe {
    system: Arc<Mutex<System>>,
    cpu_count: usize,
    total_memory: u64,
    heartbeat: Option<Arc<dyn HeartbeatSource>>,
    queue: Option<Arc<dyn QueueInspector>>,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        let cpu_count = system.cpus().len().max(1);
        let total_memory = system.total_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
            cpu_count,
            total_memory,
            heartbeat: None,
            queue: None,
        }
    }

    pub fn with_heartbeat(mut self, source: Arc<dyn HeartbeatSource>) -> Self {
        self.heartbeat = Some(source);
        self
    }

    pub fn with_queue_inspector(mut self, inspector: Arc<dyn QueueInspector>) -> Self {
        self.queue = Some(inspector);
        self
    }

    /// CPU and memory share for `handle`, read on the blocking pool.
    async fn resources(&self, descriptor: &WorkerDescriptor) -> VigilResult<Option<(f32, f32)>> {
        let system = self.system.clone();
        let handle = descriptor.process_handle;
        let (cpu_count, total_memory) = (self.cpu_count, self.total_memory);

        let usage = tokio::task::spawn_blocking(move || read_usage(&system, handle, cpu_count, total_memory))
            .await
            .map_err(|e| VigilError::Internal(format!("Process probe task failed: {}", e)))?;
        if usage.is_none() {
            debug!("{} has no live process at {}", descriptor.worker_id, handle);
        }
        Ok(usage)
    }
}

/// `None` when the pid is gone or now belongs to a different process.
fn read_usage(system: &Mutex<System>, handle: ProcessHandle, cpu_count: usize, total_memory: u64) -> Option<(f32, f32)> {
    let pid = Pid::from_u32(handle.pid);

    let mut system = system.lock();
    if !system.refresh_process(pid) {
        return None;
    }
    let process = system.process(pid)?;
    if handle.start_time != 0 && process.start_time() != handle.start_time {
        debug!("pid {} was recycled", handle.pid);
        return None;
    }

    let cpu = process.cpu_usage() / cpu_count as f32;
    let mem = if total_memory > 0 {
        (process.memory() as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };
    Some((cpu, mem))
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for SystemProbe {
    async fn probe(&self, descriptor: &WorkerDescriptor) -> VigilResult<HealthSample> {
        let worker_id = descriptor.worker_id.clone();
        let Some((cpu, mem)) = self.resources(descriptor).await? else {
            return Ok(HealthSample::gone(worker_id));
        };

        let heartbeat_age_secs = match &self.heartbeat {
            Some(source) => source.heartbeat_age(&worker_id).await,
            None => None,
        };

        let queue_backlog = match &self.queue {
            Some(inspector) => match inspector.backlog(&descriptor.worker_type).await {
                Ok(backlog) => Some(backlog),
                Err(e) => {
                    debug!("Backlog unavailable for {}: {}", descriptor.worker_type, e);
                    None
                }
            },
            None => None,
        };

        Ok(HealthSample {
            worker_id,
            timestamp: Utc::now(),
            heartbeat_age_secs,
            cpu_percent: Some(cpu),
            mem_percent: Some(mem),
            queue_backlog,
            probe_succeeded: true,
            process_present: true,
        })
    }
}
