use crate::worker::{WorkerId, WorkerStatus, WorkerType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    Unresponsive,
    Crashed,
    ResourceExhaustion,
    BacklogOverflow,
    Transient,
}

impl FailureCategory {
    pub fn default_strategy(&self) -> Strategy {
        match self {
            FailureCategory::Crashed => Strategy::HardRestart,
            FailureCategory::Unresponsive => Strategy::SoftRestart,
            FailureCategory::ResourceExhaustion => Strategy::ScaleUp,
            FailureCategory::BacklogOverflow => Strategy::ScaleUp,
            FailureCategory::Transient => Strategy::AlertOnly,
        }
    }

    /// Ordered strategies to fall back through when earlier ones fail within
    /// the same incident and no learned evidence says otherwise.
    pub fn fallback_chain(&self) -> &'static [Strategy] {
        match self {
            FailureCategory::Crashed => &[Strategy::HardRestart, Strategy::SoftRestart],
            FailureCategory::Unresponsive => &[Strategy::SoftRestart, Strategy::HardRestart],
            FailureCategory::ResourceExhaustion => &[Strategy::ScaleUp, Strategy::HardRestart],
            FailureCategory::BacklogOverflow => &[Strategy::ScaleUp, Strategy::SoftRestart],
            FailureCategory::Transient => &[Strategy::AlertOnly],
        }
    }

    pub fn requires_action(&self) -> bool {
        !matches!(self, FailureCategory::Transient)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCategory::Unresponsive => write!(f, "unresponsive"),
            FailureCategory::Crashed => write!(f, "crashed"),
            FailureCategory::ResourceExhaustion => write!(f, "resource_exhaustion"),
            FailureCategory::BacklogOverflow => write!(f, "backlog_overflow"),
            FailureCategory::Transient => write!(f, "transient"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    SoftRestart,
    HardRestart,
    ScaleUp,
    ScaleDown,
    AlertOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::SoftRestart,
        Strategy::HardRestart,
        Strategy::ScaleUp,
        Strategy::ScaleDown,
        Strategy::AlertOnly,
    ];

    pub fn stops_worker(&self) -> bool {
        matches!(self, Strategy::SoftRestart | Strategy::HardRestart | Strategy::ScaleDown)
    }

    /// Strategies after which the same worker id is expected back in service.
    pub fn awaits_health(&self) -> bool {
        !matches!(self, Strategy::ScaleDown)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::SoftRestart => write!(f, "soft_restart"),
            Strategy::HardRestart => write!(f, "hard_restart"),
            Strategy::ScaleUp => write!(f, "scale_up"),
            Strategy::ScaleDown => write!(f, "scale_down"),
            Strategy::AlertOnly => write!(f, "alert_only"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
            Outcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Append-only incident record. `completed_at` and `outcome` are set once by
/// [`RecoveryAttempt::finalize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub attempt_id: Uuid,
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub failure_category: FailureCategory,
    pub chosen_strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    pub detail: Option<String>,
}

impl RecoveryAttempt {
    pub fn start(
        worker_id: WorkerId,
        worker_type: WorkerType,
        failure_category: FailureCategory,
        chosen_strategy: Strategy,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            worker_id,
            worker_type,
            failure_category,
            chosen_strategy,
            started_at: Utc::now(),
            completed_at: None,
            outcome: None,
            detail: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    /// Returns `false` without touching the record if it was already finalized.
    pub fn finalize(&mut self, outcome: Outcome, detail: Option<String>) -> bool {
        if self.is_finalized() {
            return false;
        }
        let now = Utc::now();
        self.completed_at = Some(if now < self.started_at { self.started_at } else { now });
        self.outcome = Some(outcome);
        self.detail = detail;
        true
    }

    pub fn recovery_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds().max(0) as f64 / 1000.0)
    }

    pub fn profile_key(&self) -> ProfileKey {
        ProfileKey {
            worker_type: self.worker_type.clone(),
            failure_category: self.failure_category,
            strategy: self.chosen_strategy,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileKey {
    pub worker_type: WorkerType,
    pub failure_category: FailureCategory,
    pub strategy: Strategy,
}

/// Learned aggregate for one `(worker_type, failure_category, strategy)`.
///
/// `attempts`/`successes` are raw counts used as the evidence gate; the
/// weighted counterparts decay so that older outcomes count for less.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub attempts: u64,
    pub successes: u64,
    pub weighted_attempts: f64,
    pub weighted_successes: f64,
    pub mean_recovery_seconds: Option<f64>,
}

impl StrategyProfile {
    pub fn empty() -> Self {
        Self {
            attempts: 0,
            successes: 0,
            weighted_attempts: 0.0,
            weighted_successes: 0.0,
            mean_recovery_seconds: None,
        }
    }

    /// Profile with undecayed counts, mostly useful for seeding.
    pub fn from_counts(attempts: u64, successes: u64, mean_recovery_seconds: Option<f64>) -> Self {
        Self {
            attempts,
            successes,
            weighted_attempts: attempts as f64,
            weighted_successes: successes as f64,
            mean_recovery_seconds,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.weighted_attempts <= 0.0 {
            return 0.0;
        }
        (self.weighted_successes / self.weighted_attempts).clamp(0.0, 1.0)
    }
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Payload handed to the incident channel on escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentAlert {
    pub severity: Severity,
    pub worker_id: WorkerId,
    pub failure_category: FailureCategory,
    pub chosen_strategy: Strategy,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Discovered,
    Removed,
    StatusChanged { from: WorkerStatus, to: WorkerStatus },
    Classified { category: FailureCategory },
    RecoveryStarted { attempt_id: Uuid, strategy: Strategy },
    RecoveryFinished { attempt_id: Uuid, outcome: Outcome },
    RecoveryRejected { reason: String },
    Escalated { attempt_id: Uuid },
    Reset,
}

/// Entry of the append-only supervision journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupervisionEvent {
    pub timestamp: DateTime<Utc>,
    pub worker_id: WorkerId,
    pub kind: EventKind,
}

impl SupervisionEvent {
    pub fn new(worker_id: WorkerId, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            worker_id,
            kind,
        }
    }
}
