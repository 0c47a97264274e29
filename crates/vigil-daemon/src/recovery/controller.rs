use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_types::{IncidentAlert, ProcessHandle, Severity, VigilError, VigilResult, WorkerType};

use crate::config::WorkerTypeConfig;

#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Stops the process. `ProcessNotFoundDuringAction` when it is already
    /// gone.
    async fn stop(&self, handle: ProcessHandle, graceful: bool) -> VigilResult<()>;

    async fn start(&self, worker_type: &WorkerType) -> VigilResult<ProcessHandle>;
}

#[async_trait]
pub trait Scaler: Send + Sync {
    async fn scale(&self, worker_type: &WorkerType, delta: i32) -> VigilResult<()>;
}

#[async_trait]
pub trait IncidentChannel: Send + Sync {
    async fn emit(&self, alert: IncidentAlert) -> VigilResult<()>;
}

/// Signals local processes and spawns new ones from the worker type's
/// configured command.
pub struct LocalProcessController {
    worker_types: HashMap<String, WorkerTypeConfig>,
    stop_grace: Duration,
}

impl LocalProcessController {
    pub fn new(worker_types: &[WorkerTypeConfig], stop_grace: Duration) -> Self {
        Self {
            worker_types: worker_types.iter().map(|w| (w.name.clone(), w.clone())).collect(),
            stop_grace,
        }
    }

    #[cfg(unix)]
    fn signal(pid: u32, signal: Option<nix::sys::signal::Signal>) -> VigilResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| VigilError::RecoveryActionFailed(format!("pid {} out of range", pid)))?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(VigilError::ProcessNotFoundDuringAction(format!("pid {}", pid))),
            Err(e) => Err(VigilError::RecoveryActionFailed(format!(
                "Failed to signal pid {}: {}",
                pid, e
            ))),
        }
    }

    #[cfg(unix)]
    async fn wait_exit(pid: u32, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if Self::signal(pid, None).is_err() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[async_trait]
impl ProcessController for LocalProcessController {
    #[cfg(unix)]
    async fn stop(&self, handle: ProcessHandle, graceful: bool) -> VigilResult<()> {
        use nix::sys::signal::Signal;

        if graceful {
            Self::signal(handle.pid, Some(Signal::SIGTERM))?;
            if Self::wait_exit(handle.pid, self.stop_grace).await {
                debug!("{} exited after SIGTERM", handle);
                return Ok(());
            }
            warn!("{} ignored SIGTERM for {:?}, sending SIGKILL", handle, self.stop_grace);
        }

        match Self::signal(handle.pid, Some(Signal::SIGKILL)) {
            Ok(()) | Err(VigilError::ProcessNotFoundDuringAction(_)) if graceful => Ok(()),
            result => result,
        }
    }

    #[cfg(not(unix))]
    async fn stop(&self, handle: ProcessHandle, _graceful: bool) -> VigilResult<()> {
        Err(VigilError::RecoveryActionFailed(format!(
            "Stopping {} is not supported on this platform",
            handle
        )))
    }

    async fn start(&self, worker_type: &WorkerType) -> VigilResult<ProcessHandle> {
        let config = self
            .worker_types
            .get(worker_type.as_str())
            .ok_or_else(|| VigilError::RecoveryActionFailed(format!("Unknown worker type {}", worker_type)))?;
        let command = config.command.as_deref().ok_or_else(|| {
            VigilError::RecoveryActionFailed(format!("Worker type {} has no start command", worker_type))
        })?;

        let child = tokio::process::Command::new(command)
            .args(&config.args)
            .stdin(std::process::Stdio::null())
            .spawn()
            .map_err(|e| VigilError::RecoveryActionFailed(format!("Failed to spawn {}: {}", command, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| VigilError::RecoveryActionFailed(format!("{} exited immediately", command)))?;
        info!("Started {} worker as pid {}", worker_type, pid);

        Ok(ProcessHandle::new(pid, 0))
    }
}

/// Scales a worker type by starting instances through a controller. Scaling
/// down is acknowledged only; the executor stops the targeted instance.
pub struct ProcessScaler {
    controller: Arc<dyn ProcessController>,
}

impl ProcessScaler {
    pub fn new(controller: Arc<dyn ProcessController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Scaler for ProcessScaler {
    async fn scale(&self, worker_type: &WorkerType, delta: i32) -> VigilResult<()> {
        if delta <= 0 {
            debug!("Scale {} by {} acknowledged", worker_type, delta);
            return Ok(());
        }
        for _ in 0..delta {
            self.controller.start(worker_type).await?;
        }
        info!("Scaled {} up by {}", worker_type, delta);
        Ok(())
    }
}

/// Writes alerts to the log as structured records.
#[derive(Default)]
pub struct LogIncidentChannel;

#[async_trait]
impl IncidentChannel for LogIncidentChannel {
    async fn emit(&self, alert: IncidentAlert) -> VigilResult<()> {
        match alert.severity {
            Severity::Critical => error!(
                worker_id = %alert.worker_id,
                failure_category = %alert.failure_category,
                strategy = %alert.chosen_strategy,
                outcome = %alert.outcome,
                "INCIDENT: worker escalated"
            ),
            Severity::Warning => warn!(
                worker_id = %alert.worker_id,
                failure_category = %alert.failure_category,
                strategy = %alert.chosen_strategy,
                outcome = %alert.outcome,
                "incident"
            ),
            Severity::Info => info!(
                worker_id = %alert.worker_id,
                failure_category = %alert.failure_category,
                "incident"
            ),
        }
        Ok(())
    }
}

/// Forwards alerts to an in-process receiver.
pub struct ChannelIncidentSink {
    sender: mpsc::UnboundedSender<IncidentAlert>,
}

impl ChannelIncidentSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IncidentAlert>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl IncidentChannel for ChannelIncidentSink {
    async fn emit(&self, alert: IncidentAlert) -> VigilResult<()> {
        self.sender
            .send(alert)
            .map_err(|_| VigilError::Internal("Incident receiver dropped".into()))
    }
}
