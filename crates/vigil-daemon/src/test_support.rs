//! Fakes shared by the recovery and supervisor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_types::{
    HealthSample, IncidentAlert, ProcessHandle, VigilError, VigilResult, WorkerDescriptor, WorkerId, WorkerType,
};

use crate::probe::HealthProbe;
use crate::recovery::{IncidentChannel, ProcessController};
use crate::registry::{DiscoverySource, RosterDiscovery};

pub fn descriptor(id: &str, pid: u32) -> WorkerDescriptor {
    WorkerDescriptor::new(WorkerId::new(id), WorkerType::new("task-processor"), ProcessHandle::new(pid, 1))
}

pub fn roster(workers: &[&str]) -> Arc<RosterDiscovery> {
    Arc::new(RosterDiscovery::with_workers(
        workers
            .iter()
            .enumerate()
            .map(|(i, id)| descriptor(id, 100 + i as u32))
            .collect(),
    ))
}

/// Every worker reports a stale heartbeat until `healthy` is set. Workers in
/// `gone` report a vanished process.
pub struct SwitchProbe {
    pub healthy: Arc<AtomicBool>,
    pub gone: Mutex<HashSet<WorkerId>>,
}

impl SwitchProbe {
    pub fn new(healthy: Arc<AtomicBool>) -> Self {
        Self {
            healthy,
            gone: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn probe(&self, descriptor: &WorkerDescriptor) -> VigilResult<HealthSample> {
        let worker_id = descriptor.worker_id.clone();
        if self.gone.lock().contains(&worker_id) {
            return Ok(HealthSample::gone(worker_id));
        }
        let sample = HealthSample::healthy(worker_id);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(sample)
        } else {
            Ok(sample.with_heartbeat_age(600.0))
        }
    }
}

/// Starting a worker flips the shared health switch on.
pub struct FakeController {
    pub healthy: Arc<AtomicBool>,
    pub next_pid: AtomicU32,
    pub stops: AtomicU32,
    pub starts: AtomicU32,
    pub stop_missing: AtomicBool,
    pub fail_start: AtomicBool,
    pub delay: Duration,
}

impl FakeController {
    pub fn new(healthy: Arc<AtomicBool>, delay: Duration) -> Self {
        Self {
            healthy,
            next_pid: AtomicU32::new(5_000),
            stops: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            stop_missing: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            delay,
        }
    }
}

#[async_trait]
impl ProcessController for FakeController {
    async fn stop(&self, _handle: ProcessHandle, _graceful: bool) -> VigilResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.stop_missing.load(Ordering::SeqCst) {
            return Err(VigilError::ProcessNotFoundDuringAction("gone".into()));
        }
        Ok(())
    }

    async fn start(&self, _worker_type: &WorkerType) -> VigilResult<ProcessHandle> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(VigilError::RecoveryActionFailed("spawn failed".into()));
        }
        self.healthy.store(true, Ordering::SeqCst);
        Ok(ProcessHandle::new(self.next_pid.fetch_add(1, Ordering::SeqCst), 0))
    }
}

/// Roster discovery that can be told to fail or to stop answering.
pub struct FlakyDiscovery {
    pub inner: Arc<RosterDiscovery>,
    pub failing: AtomicBool,
    pub hanging: AtomicBool,
}

#[async_trait]
impl DiscoverySource for FlakyDiscovery {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn list_workers(&self) -> VigilResult<Vec<WorkerDescriptor>> {
        if self.hanging.load(Ordering::SeqCst) {
            return futures::future::pending().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(VigilError::Discovery("roster unavailable".into()));
        }
        self.inner.list_workers().await
    }
}

/// Discovery that never answers.
pub struct HangingDiscovery;

#[async_trait]
impl DiscoverySource for HangingDiscovery {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn list_workers(&self) -> VigilResult<Vec<WorkerDescriptor>> {
        futures::future::pending().await
    }
}

/// Incident channel that never acknowledges an alert.
pub struct HangingIncidents {
    pub received: AtomicU32,
}

#[async_trait]
impl IncidentChannel for HangingIncidents {
    async fn emit(&self, _alert: IncidentAlert) -> VigilResult<()> {
        self.received.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }
}
