use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerType(pub String);

impl WorkerType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque OS handle. `start_time` disambiguates a recycled pid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub start_time: u64,
}

impl ProcessHandle {
    pub fn new(pid: u32, start_time: u64) -> Self {
        Self { pid, start_time }
    }

    /// Same pid, and same start time when both sides know it. A start time
    /// of 0 means "not recorded".
    pub fn same_process(&self, other: &ProcessHandle) -> bool {
        self.pid == other.pid
            && (self.start_time == 0 || other.start_time == 0 || self.start_time == other.start_time)
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.pid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub process_handle: ProcessHandle,
    pub created_at: DateTime<Utc>,
}

impl WorkerDescriptor {
    pub fn new(worker_id: WorkerId, worker_type: WorkerType, process_handle: ProcessHandle) -> Self {
        Self {
            worker_id,
            worker_type,
            process_handle,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Unknown,
    Healthy,
    Degraded,
    Recovering,
    Escalated,
}

impl WorkerStatus {
    pub const ALL: [WorkerStatus; 5] = [
        WorkerStatus::Unknown,
        WorkerStatus::Healthy,
        WorkerStatus::Degraded,
        WorkerStatus::Recovering,
        WorkerStatus::Escalated,
    ];

    /// Edges of the supervision state machine. Self-loops are not transitions.
    pub fn can_transition_to(&self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        matches!(
            (self, next),
            (Unknown, Healthy)
                // A new worker that fails its first probes degrades without ever being healthy.
                | (Unknown, Degraded)
                | (Healthy, Degraded)
                | (Degraded, Healthy)
                | (Degraded, Recovering)
                | (Recovering, Healthy)
                | (Recovering, Degraded)
                | (Recovering, Escalated)
                | (Escalated, Unknown)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Escalated)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Unknown => write!(f, "unknown"),
            WorkerStatus::Healthy => write!(f, "healthy"),
            WorkerStatus::Degraded => write!(f, "degraded"),
            WorkerStatus::Recovering => write!(f, "recovering"),
            WorkerStatus::Escalated => write!(f, "escalated"),
        }
    }
}

/// Single-writer record for one worker.
///
/// `active_recovery_id` is `Some` exactly when `status == Recovering`; the
/// setters below are the only way to enter or leave that state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub consecutive_failures: u32,
    pub last_transition_at: DateTime<Utc>,
    active_recovery_id: Option<Uuid>,
}

impl WorkerState {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            status: WorkerStatus::Unknown,
            consecutive_failures: 0,
            last_transition_at: Utc::now(),
            active_recovery_id: None,
        }
    }

    pub fn active_recovery_id(&self) -> Option<Uuid> {
        self.active_recovery_id
    }

    /// Moves to `next` if the edge exists. Entering or leaving `Recovering`
    /// is refused here; use [`WorkerState::begin_recovery`] and
    /// [`WorkerState::end_recovery`].
    pub fn transition(&mut self, next: WorkerStatus) -> bool {
        if next == WorkerStatus::Recovering || self.status == WorkerStatus::Recovering {
            return false;
        }
        self.set_status(next)
    }

    pub fn begin_recovery(&mut self, attempt_id: Uuid) -> bool {
        if self.active_recovery_id.is_some() || !self.status.can_transition_to(WorkerStatus::Recovering) {
            return false;
        }
        self.active_recovery_id = Some(attempt_id);
        self.status = WorkerStatus::Recovering;
        self.last_transition_at = Utc::now();
        true
    }

    pub fn end_recovery(&mut self, attempt_id: Uuid, next: WorkerStatus) -> bool {
        if self.active_recovery_id != Some(attempt_id) || !WorkerStatus::Recovering.can_transition_to(next) {
            return false;
        }
        self.active_recovery_id = None;
        self.status = next;
        self.last_transition_at = Utc::now();
        true
    }

    /// Brings back an escalation recorded by a previous run. Only a fresh
    /// `Unknown` state can be restored; this is not a state machine edge.
    pub fn restore_escalated(&mut self) -> bool {
        if self.status != WorkerStatus::Unknown || self.active_recovery_id.is_some() {
            return false;
        }
        self.status = WorkerStatus::Escalated;
        self.last_transition_at = Utc::now();
        true
    }

    fn set_status(&mut self, next: WorkerStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.last_transition_at = Utc::now();
        true
    }
}
