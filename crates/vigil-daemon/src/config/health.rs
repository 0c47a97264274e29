use serde::{Deserialize, Serialize};
use vigil_types::{HealthSample, DEFAULT_DEGRADE_AFTER, DEFAULT_RECOVER_AFTER, DEFAULT_WINDOW_SIZE};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub degrade_after: u32,
    pub recover_after: u32,
    pub window_size: usize,
    pub heartbeat_stale_secs: f64,
    pub cpu_percent_threshold: f32,
    pub mem_percent_threshold: f32,
    pub backlog_threshold: u64,
    pub sustain_samples: usize,
    pub removal_debounce_ticks: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degrade_after: DEFAULT_DEGRADE_AFTER,
            recover_after: DEFAULT_RECOVER_AFTER,
            window_size: DEFAULT_WINDOW_SIZE,
            heartbeat_stale_secs: 30.0,
            cpu_percent_threshold: 90.0,
            mem_percent_threshold: 90.0,
            backlog_threshold: 1_000,
            sustain_samples: 3,
            removal_debounce_ticks: 2,
        }
    }
}

impl HealthConfig {
    pub fn heartbeat_stale(&self, sample: &HealthSample) -> bool {
        sample
            .heartbeat_age_secs
            .map(|age| age > self.heartbeat_stale_secs)
            .unwrap_or(false)
    }

    pub fn resource_exceeded(&self, sample: &HealthSample) -> bool {
        sample.cpu_percent.map(|c| c > self.cpu_percent_threshold).unwrap_or(false)
            || sample.mem_percent.map(|m| m > self.mem_percent_threshold).unwrap_or(false)
    }

    pub fn backlog_exceeded(&self, sample: &HealthSample) -> bool {
        sample.queue_backlog.map(|b| b > self.backlog_threshold).unwrap_or(false)
    }

    /// A sample counts toward the consecutive-failure streak if any signal
    /// is outside its threshold.
    pub fn is_unhealthy(&self, sample: &HealthSample) -> bool {
        !sample.probe_succeeded
            || !sample.process_present
            || self.heartbeat_stale(sample)
            || self.resource_exceeded(sample)
            || self.backlog_exceeded(sample)
    }
}
