use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vigil_types::{VigilError, VigilResult};

use super::constants::{DEFAULT_RESET_DIR, DEFAULT_STATUS_FILE, DEFAULT_STORAGE_DIR};
use super::discovery::{DiscoveryConfig, WorkerTypeConfig};
use super::health::HealthConfig;
use super::learning::LearningConfig;
use super::logging::LoggingConfig;
use super::persistence::PersistenceConfig;
use super::supervisor::SupervisorSettings;
use super::types::{DiscoveryMode, LogLevel};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub supervisor: SupervisorSettings,
    pub health: HealthConfig,
    pub learning: LearningConfig,
    pub persistence: PersistenceConfig,
    pub discovery: DiscoveryConfig,
    pub worker_types: Vec<WorkerTypeConfig>,
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/vigil"));

        Self {
            data_dir: home.join(".vigil"),
            supervisor: SupervisorSettings::default(),
            health: HealthConfig::default(),
            learning: LearningConfig::default(),
            persistence: PersistenceConfig::default(),
            discovery: DiscoveryConfig::default(),
            worker_types: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> VigilResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VigilError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| VigilError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> VigilResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| VigilError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VigilError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| VigilError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("VIGIL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("VIGIL_TICK_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.supervisor.tick_interval_secs = s;
            }
        }

        if let Ok(max) = std::env::var("VIGIL_MAX_CONCURRENT_RECOVERIES") {
            if let Ok(m) = max.parse() {
                self.supervisor.max_concurrent_recoveries = m;
            }
        }

        if let Ok(ms) = std::env::var("VIGIL_PROBE_TIMEOUT_MS") {
            if let Ok(m) = ms.parse() {
                self.supervisor.probe_timeout_ms = m;
            }
        }

        if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
            self.logging.level = match level.to_lowercase().as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" => LogLevel::Trace,
                _ => LogLevel::Info,
            };
        }

        if std::env::var("VIGIL_LOG_JSON").is_ok() {
            self.logging.json = true;
        }
    }

    pub fn validate(&self) -> VigilResult<()> {
        let s = &self.supervisor;
        if s.tick_interval_secs == 0 {
            return Err(VigilError::Config("tick_interval_secs cannot be 0".into()));
        }
        if s.max_concurrent_probes == 0 {
            return Err(VigilError::Config("max_concurrent_probes cannot be 0".into()));
        }
        if s.probe_timeout_ms == 0 {
            return Err(VigilError::Config("probe_timeout_ms cannot be 0".into()));
        }
        if s.discovery_timeout_ms == 0 {
            return Err(VigilError::Config("discovery_timeout_ms cannot be 0".into()));
        }
        if s.max_concurrent_recoveries == 0 {
            return Err(VigilError::Config(
                "max_concurrent_recoveries cannot be 0".into(),
            ));
        }
        if s.action_timeout_secs == 0 || s.recovery_timeout_secs == 0 {
            return Err(VigilError::Config("Recovery timeouts cannot be 0".into()));
        }
        if s.recovery_poll_interval_ms == 0 {
            return Err(VigilError::Config(
                "recovery_poll_interval_ms cannot be 0".into(),
            ));
        }
        if s.escalation_threshold == 0 {
            return Err(VigilError::Config("escalation_threshold cannot be 0".into()));
        }
        if s.digest_interval_ticks == 0 {
            return Err(VigilError::Config("digest_interval_ticks cannot be 0".into()));
        }

        let h = &self.health;
        if h.degrade_after == 0 {
            return Err(VigilError::Config("degrade_after cannot be 0".into()));
        }
        if h.recover_after <= h.degrade_after {
            return Err(VigilError::Config(format!(
                "recover_after ({}) must be greater than degrade_after ({})",
                h.recover_after, h.degrade_after
            )));
        }
        if h.window_size < h.recover_after as usize {
            return Err(VigilError::Config(format!(
                "window_size ({}) must hold at least recover_after ({}) samples",
                h.window_size, h.recover_after
            )));
        }
        if h.sustain_samples < 2 {
            return Err(VigilError::Config("sustain_samples must be at least 2".into()));
        }
        if h.sustain_samples > h.window_size {
            return Err(VigilError::Config(
                "sustain_samples cannot exceed window_size".into(),
            ));
        }
        if h.removal_debounce_ticks < 2 {
            return Err(VigilError::Config(
                "removal_debounce_ticks must be at least 2".into(),
            ));
        }
        if h.heartbeat_stale_secs <= 0.0 {
            return Err(VigilError::Config("heartbeat_stale_secs must be positive".into()));
        }

        let l = &self.learning;
        if l.min_evidence == 0 {
            return Err(VigilError::Config("min_evidence cannot be 0".into()));
        }
        if !(l.ema_alpha > 0.0 && l.ema_alpha <= 1.0) {
            return Err(VigilError::Config(format!(
                "ema_alpha must be in (0, 1], got {}",
                l.ema_alpha
            )));
        }
        if !(l.decay > 0.0 && l.decay <= 1.0) {
            return Err(VigilError::Config(format!(
                "decay must be in (0, 1], got {}",
                l.decay
            )));
        }

        let p = &self.persistence;
        if p.write_timeout_ms == 0 || p.max_buffered == 0 {
            return Err(VigilError::Config(
                "Persistence write timeout and buffer size cannot be 0".into(),
            ));
        }
        if p.retry_base_ms == 0 || p.retry_max_ms < p.retry_base_ms {
            return Err(VigilError::Config(
                "retry_max_ms must be at least retry_base_ms and both non-zero".into(),
            ));
        }

        let mut names = HashSet::new();
        for worker_type in &self.worker_types {
            if worker_type.name.trim().is_empty() {
                return Err(VigilError::Config("Worker type name cannot be empty".into()));
            }
            if worker_type.match_pattern.is_empty() {
                return Err(VigilError::Config(format!(
                    "Worker type '{}' has an empty match_pattern",
                    worker_type.name
                )));
            }
            if !names.insert(worker_type.name.as_str()) {
                return Err(VigilError::Config(format!(
                    "Duplicate worker type: {}",
                    worker_type.name
                )));
            }
        }

        if self.worker_types.is_empty() && self.discovery.mode == DiscoveryMode::Process {
            warn!("No worker_types configured - process discovery will find nothing");
        }

        Ok(())
    }

    pub fn worker_type(&self, name: &str) -> Option<&WorkerTypeConfig> {
        self.worker_types.iter().find(|w| w.name == name)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_STORAGE_DIR)
    }

    pub fn status_file(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_STATUS_FILE)
    }

    pub fn reset_dir(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_RESET_DIR)
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            data_dir: self.data_dir.clone(),
            discovery_mode: self.discovery.mode,
            worker_types: self.worker_types.iter().map(|w| w.name.clone()).collect(),
            tick_interval_secs: self.supervisor.tick_interval_secs,
            max_concurrent_probes: self.supervisor.max_concurrent_probes,
            max_concurrent_recoveries: self.supervisor.max_concurrent_recoveries,
            degrade_after: self.health.degrade_after,
            recover_after: self.health.recover_after,
            escalation_threshold: self.supervisor.escalation_threshold,
            min_evidence: self.learning.min_evidence,
            log_level: self.logging.level,
        }
    }
}

#[derive(Debug)]
pub struct ConfigSummary {
    pub data_dir: PathBuf,
    pub discovery_mode: DiscoveryMode,
    pub worker_types: Vec<String>,
    pub tick_interval_secs: u64,
    pub max_concurrent_probes: usize,
    pub max_concurrent_recoveries: usize,
    pub degrade_after: u32,
    pub recover_after: u32,
    pub escalation_threshold: u32,
    pub min_evidence: u64,
    pub log_level: LogLevel,
}

impl std::fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "vigil Supervisor Configuration")?;
        writeln!(f, "==============================")?;
        writeln!(f, "Data dir: {:?}", self.data_dir)?;
        writeln!(f, "Discovery: {}", self.discovery_mode)?;
        if self.worker_types.is_empty() {
            writeln!(f, "Worker types: (none)")?;
        } else {
            writeln!(f, "Worker types: {}", self.worker_types.join(", "))?;
        }
        writeln!(f, "Tick interval: {}s", self.tick_interval_secs)?;
        writeln!(f, "Max probes in flight: {}", self.max_concurrent_probes)?;
        writeln!(f, "Max concurrent recoveries: {}", self.max_concurrent_recoveries)?;
        writeln!(
            f,
            "Hysteresis: degrade after {}, recover after {}",
            self.degrade_after, self.recover_after
        )?;
        writeln!(f, "Escalation after {} failed attempts", self.escalation_threshold)?;
        writeln!(f, "Min evidence: {}", self.min_evidence)?;
        writeln!(f, "Log level: {}", self.log_level)?;
        Ok(())
    }
}
