use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};
use vigil_types::{HealthSample, VigilError, WorkerDescriptor};

use super::HealthProbe;

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct ProberStats {
    pub probes: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Runs a [`HealthProbe`] under a hard deadline and fans out over the fleet
/// with a bounded number of probes in flight.
pub struct HealthProber {
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    max_in_flight: usize,
    probes: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

impl HealthProber {
    pub fn new(probe: Arc<dyn HealthProbe>, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            probe,
            timeout,
            max_in_flight: max_in_flight.max(1),
            probes: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Never fails: a probe that errors or misses its deadline yields a
    /// sample with `probe_succeeded = false`.
    pub async fn probe(&self, descriptor: &WorkerDescriptor, timeout: Duration) -> HealthSample {
        self.probes.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(timeout, self.probe.probe(descriptor)).await {
            Ok(Ok(sample)) => {
                trace!(
                    "Probe {} ok={} present={} hb={:?} cpu={:?} mem={:?} backlog={:?}",
                    descriptor.worker_id,
                    sample.probe_succeeded,
                    sample.process_present,
                    sample.heartbeat_age_secs,
                    sample.cpu_percent,
                    sample.mem_percent,
                    sample.queue_backlog
                );
                sample
            }
            Ok(Err(e)) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                debug!("Probe for {} failed: {}", descriptor.worker_id, e);
                HealthSample::failed(descriptor.worker_id.clone())
            }
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let err = VigilError::ProbeTimeout(format!("{} after {:?}", descriptor.worker_id, timeout));
                warn!("{}", err);
                HealthSample::failed(descriptor.worker_id.clone())
            }
        }
    }

    pub async fn sample(&self, descriptor: &WorkerDescriptor) -> HealthSample {
        self.probe(descriptor, self.timeout).await
    }

    /// One sample per descriptor, in input order. Each probe runs as its own
    /// task; at most `max_in_flight` hold a permit at once.
    pub async fn probe_all(self: &Arc<Self>, descriptors: &[WorkerDescriptor]) -> Vec<HealthSample> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for (index, descriptor) in descriptors.iter().cloned().enumerate() {
            let prober = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (index, prober.probe(&descriptor, prober.timeout).await)
            });
        }

        let mut samples: Vec<Option<HealthSample>> = vec![None; descriptors.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, sample)) => samples[index] = Some(sample),
                Err(e) => error!("Probe task failed: {}", e),
            }
        }

        samples
            .into_iter()
            .zip(descriptors)
            .map(|(sample, d)| sample.unwrap_or_else(|| HealthSample::failed(d.worker_id.clone())))
            .collect()
    }

    pub fn stats(&self) -> ProberStats {
        ProberStats {
            probes: self.probes.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
