use crate::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of a worker. Immutable once produced by a probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub worker_id: WorkerId,
    pub timestamp: DateTime<Utc>,
    pub heartbeat_age_secs: Option<f64>,
    pub cpu_percent: Option<f32>,
    pub mem_percent: Option<f32>,
    pub queue_backlog: Option<u64>,
    pub probe_succeeded: bool,
    pub process_present: bool,
}

impl HealthSample {
    pub fn healthy(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            timestamp: Utc::now(),
            heartbeat_age_secs: Some(0.0),
            cpu_percent: Some(0.0),
            mem_percent: Some(0.0),
            queue_backlog: Some(0),
            probe_succeeded: true,
            process_present: true,
        }
    }

    /// Sample for a probe that timed out or errored. Nothing is known about
    /// the process, so it is not reported as gone.
    pub fn failed(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            timestamp: Utc::now(),
            heartbeat_age_secs: None,
            cpu_percent: None,
            mem_percent: None,
            queue_backlog: None,
            probe_succeeded: false,
            process_present: true,
        }
    }

    /// Sample for a worker whose OS handle no longer resolves.
    pub fn gone(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            timestamp: Utc::now(),
            heartbeat_age_secs: None,
            cpu_percent: None,
            mem_percent: None,
            queue_backlog: None,
            probe_succeeded: true,
            process_present: false,
        }
    }

    pub fn with_heartbeat_age(mut self, secs: f64) -> Self {
        self.heartbeat_age_secs = Some(secs);
        self
    }

    pub fn with_resources(mut self, cpu_percent: f32, mem_percent: f32) -> Self {
        self.cpu_percent = Some(cpu_percent);
        self.mem_percent = Some(mem_percent);
        self
    }

    pub fn with_backlog(mut self, backlog: u64) -> Self {
        self.queue_backlog = Some(backlog);
        self
    }
}
