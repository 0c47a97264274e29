#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
mod health;
mod recovery;
mod worker;

pub use error::{VigilError, VigilResult};
pub use health::HealthSample;
pub use recovery::{
    EventKind, FailureCategory, IncidentAlert, Outcome, ProfileKey, RecoveryAttempt, Severity,
    Strategy, StrategyProfile, SupervisionEvent,
};
pub use worker::{ProcessHandle, WorkerDescriptor, WorkerId, WorkerState, WorkerStatus, WorkerType};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 10;

pub const DEFAULT_DEGRADE_AFTER: u32 = 2;

pub const DEFAULT_RECOVER_AFTER: u32 = 4;

pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

pub const DEFAULT_WINDOW_SIZE: usize = 10;
