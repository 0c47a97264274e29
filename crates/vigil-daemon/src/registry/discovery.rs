use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, trace};
use vigil_types::{ProcessHandle, VigilError, VigilResult, WorkerDescriptor, WorkerId, WorkerType};

use crate::config::WorkerTypeConfig;

/// Source of the current set of live workers.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_workers(&self) -> VigilResult<Vec<WorkerDescriptor>>;
}

/// Matches the local process table against each worker type's pattern.
pub struct ProcessScanDiscovery {
    worker_types: Arc<Vec<WorkerTypeConfig>>,
    system: Arc<Mutex<System>>,
}

impl ProcessScanDiscovery {
    pub fn new(worker_types: Vec<WorkerTypeConfig>) -> Self {
        Self {
            worker_types: Arc::new(worker_types),
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Walks the process table. Blocking; run it off the async runtime.
    fn scan(system: &Mutex<System>, worker_types: &[WorkerTypeConfig]) -> Vec<WorkerDescriptor> {
        let mut system = system.lock();
        system.refresh_processes();

        let own_pid = std::process::id();
        let mut found = Vec::new();

        for (pid, process) in system.processes() {
            if pid.as_u32() == own_pid {
                continue;
            }
            let cmd = process.cmd();
            if cmd.is_empty() {
                continue;
            }
            let command_line = cmd.join(" ");

            let Some(worker_type) = worker_types
                .iter()
                .find(|w| command_line.contains(&w.match_pattern))
            else {
                continue;
            };

            let worker_id = worker_type
                .id_flag
                .as_deref()
                .and_then(|flag| flag_value(cmd, flag))
                .map(WorkerId::new)
                .unwrap_or_else(|| WorkerId::new(format!("{}-{}", worker_type.name, pid.as_u32())));

            trace!("Matched {} as {} ({})", pid, worker_id, worker_type.name);
            found.push(WorkerDescriptor::new(
                worker_id,
                WorkerType::new(worker_type.name.clone()),
                ProcessHandle::new(pid.as_u32(), process.start_time()),
            ));
        }

        found.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        found
    }
}

#[async_trait]
impl DiscoverySource for ProcessScanDiscovery {
    fn name(&self) -> &'static str {
        "process-scan"
    }

    async fn list_workers(&self) -> VigilResult<Vec<WorkerDescriptor>> {
        let system = self.system.clone();
        let worker_types = self.worker_types.clone();
        let workers = tokio::task::spawn_blocking(move || Self::scan(&system, &worker_types))
            .await
            .map_err(|e| VigilError::Discovery(format!("Process scan task failed: {}", e)))?;
        debug!("Process scan found {} worker(s)", workers.len());
        Ok(workers)
    }
}

/// Value of `--flag value` or `--flag=value` in an argument list.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().filter(|v| !v.is_empty()).cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Worker list pushed in from outside, e.g. a broker's consumer roster.
#[derive(Default)]
pub struct RosterDiscovery {
    roster: RwLock<Vec<WorkerDescriptor>>,
}

impl RosterDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: Vec<WorkerDescriptor>) -> Self {
        Self {
            roster: RwLock::new(workers),
        }
    }

    pub fn replace(&self, workers: Vec<WorkerDescriptor>) {
        *self.roster.write() = workers;
    }

    pub fn upsert(&self, worker: WorkerDescriptor) {
        let mut roster = self.roster.write();
        match roster.iter_mut().find(|w| w.worker_id == worker.worker_id) {
            Some(existing) => *existing = worker,
            None => roster.push(worker),
        }
    }

    pub fn remove(&self, worker_id: &WorkerId) -> bool {
        let mut roster = self.roster.write();
        let before = roster.len();
        roster.retain(|w| &w.worker_id != worker_id);
        roster.len() != before
    }
}

#[async_trait]
impl DiscoverySource for RosterDiscovery {
    fn name(&self) -> &'static str {
        "roster"
    }

    async fn list_workers(&self) -> VigilResult<Vec<WorkerDescriptor>> {
        Ok(self.roster.read().clone())
    }
}
