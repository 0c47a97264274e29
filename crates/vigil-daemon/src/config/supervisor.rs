use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_types::{DEFAULT_ESCALATION_THRESHOLD, DEFAULT_TICK_INTERVAL_SECS};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub tick_interval_secs: u64,
    pub max_concurrent_probes: usize,
    pub probe_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub max_concurrent_recoveries: usize,
    pub action_timeout_secs: u64,
    pub recovery_timeout_secs: u64,
    pub recovery_poll_interval_ms: u64,
    pub escalation_threshold: u32,
    pub drain_timeout_secs: u64,
    pub digest_interval_ticks: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            max_concurrent_probes: 16,
            probe_timeout_ms: 2_000,
            discovery_timeout_ms: 5_000,
            max_concurrent_recoveries: 2,
            action_timeout_secs: 30,
            recovery_timeout_secs: 60,
            recovery_poll_interval_ms: 2_000,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            drain_timeout_secs: 30,
            digest_interval_ticks: 6,
        }
    }
}

impl SupervisorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn recovery_poll_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
