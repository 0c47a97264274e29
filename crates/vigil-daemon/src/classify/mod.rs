//! Failure classification. Everything here is a pure function of a sample
//! window and the health thresholds.


use vigil_types::{FailureCategory, HealthSample, WorkerId};

use crate::config::HealthConfig;

pub struct FailureClassifier {
    config: HealthConfig,
}

impl FailureClassifier {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Samples for other workers in `window` are ignored.
    ///
    /// Precedence: crashed, unresponsive, resource exhaustion, backlog
    /// overflow, transient.
    pub fn classify(&self, worker_id: &WorkerId, window: &[HealthSample]) -> FailureCategory {
        classify(worker_id, window, &self.config)
    }
}

pub fn classify(worker_id: &WorkerId, window: &[HealthSample], config: &HealthConfig) -> FailureCategory {
    let samples: Vec<&HealthSample> = window.iter().filter(|s| &s.worker_id == worker_id).collect();

    let Some(latest) = samples.last() else {
        return FailureCategory::Transient;
    };

    if !latest.process_present {
        return FailureCategory::Crashed;
    }

    let sustain = config.sustain_samples.max(1);
    if samples.len() < sustain {
        return FailureCategory::Transient;
    }
    let recent = &samples[samples.len() - sustain..];

    if is_unresponsive(recent, config) {
        return FailureCategory::Unresponsive;
    }

    if recent.iter().all(|s| config.resource_exceeded(s)) {
        return FailureCategory::ResourceExhaustion;
    }

    if is_backlog_growing(recent, config) {
        return FailureCategory::BacklogOverflow;
    }

    FailureCategory::Transient
}

fn is_unresponsive(recent: &[&HealthSample], config: &HealthConfig) -> bool {
    recent
        .iter()
        .all(|s| s.process_present && (!s.probe_succeeded || config.heartbeat_stale(s)))
}

/// Non-decreasing across the run, strictly higher at the end, and above the
/// threshold on the latest sample.
fn is_backlog_growing(recent: &[&HealthSample], config: &HealthConfig) -> bool {
    let Some(backlogs) = recent.iter().map(|s| s.queue_backlog).collect::<Option<Vec<u64>>>() else {
        return false;
    };
    let (Some(first), Some(last)) = (backlogs.first(), backlogs.last()) else {
        return false;
    };

    backlogs.windows(2).all(|pair| pair[1] >= pair[0]) && last > first && *last > config.backlog_threshold
}
