use serde::Serialize;

use super::state::StatusCounts;
use crate::probe::ProberStats;
use crate::profile::WriterStats;
use crate::recovery::ExecutorStats;

#[derive(Clone, Debug, Serialize)]
pub struct SupervisorStats {
    pub ticks: u64,
    pub uptime_secs: u64,
    pub workers: usize,
    pub counts: StatusCounts,
    pub probes: ProberStats,
    pub recoveries: ExecutorStats,
    pub persistence: WriterStats,
    pub journal_events: u64,
    pub resets: u64,
}

/// Outcome of a single [`Supervisor::tick`](super::Supervisor::tick).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub skipped: bool,
    pub discovered: usize,
    pub removed: usize,
    pub probed: usize,
    pub transitions: usize,
    pub classified: usize,
    pub recoveries_started: usize,
    pub rejected: usize,
    pub resets: usize,
}

/// What a graceful shutdown had to do.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ShutdownReport {
    pub drained: usize,
    pub abandoned: usize,
    pub unflushed: usize,
}
