use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use vigil_types::{FailureCategory, Strategy, WorkerId, WorkerState, WorkerStatus};

use crate::probe::SampleWindow;

/// Everything the supervisor tracks for one worker, guarded by that
/// worker's lock.
#[derive(Debug)]
pub struct WorkerSlot {
    pub state: WorkerState,
    pub window: SampleWindow,
    /// Consecutive FAILURE/TIMEOUT outcomes in the current incident.
    pub recovery_failures: u32,
    /// Strategies already tried in the current incident, oldest first.
    pub tried: Vec<Strategy>,
    pub last_category: Option<FailureCategory>,
}

impl WorkerSlot {
    fn new(worker_id: WorkerId, window_size: usize) -> Self {
        Self {
            state: WorkerState::new(worker_id),
            window: SampleWindow::new(window_size),
            recovery_failures: 0,
            tried: Vec::new(),
            last_category: None,
        }
    }

    /// Closes the current incident.
    pub fn clear_incident(&mut self) {
        self.state.consecutive_failures = 0;
        self.recovery_failures = 0;
        self.tried.clear();
        self.last_category = None;
    }
}

pub type SlotHandle = Arc<Mutex<WorkerSlot>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusCounts {
    pub unknown: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub recovering: usize,
    pub escalated: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.unknown + self.healthy + self.degraded + self.recovering + self.escalated
    }

    fn add(&mut self, status: WorkerStatus) {
        match status {
            WorkerStatus::Unknown => self.unknown += 1,
            WorkerStatus::Healthy => self.healthy += 1,
            WorkerStatus::Degraded => self.degraded += 1,
            WorkerStatus::Recovering => self.recovering += 1,
            WorkerStatus::Escalated => self.escalated += 1,
        }
    }
}

/// Per-worker state, one lock per worker.
pub struct WorkerStateTable {
    slots: RwLock<HashMap<WorkerId, SlotHandle>>,
    window_size: usize,
}

impl WorkerStateTable {
    pub fn new(window_size: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            window_size,
        }
    }

    /// Returns the slot and whether it was just created.
    pub fn ensure(&self, worker_id: &WorkerId) -> (SlotHandle, bool) {
        if let Some(slot) = self.slots.read().get(worker_id) {
            return (slot.clone(), false);
        }
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(worker_id) {
            return (slot.clone(), false);
        }
        let slot = Arc::new(Mutex::new(WorkerSlot::new(worker_id.clone(), self.window_size)));
        slots.insert(worker_id.clone(), slot.clone());
        (slot, true)
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<SlotHandle> {
        self.slots.read().get(worker_id).cloned()
    }

    pub fn remove(&self, worker_id: &WorkerId) -> bool {
        self.slots.write().remove(worker_id).is_some()
    }

    pub fn status(&self, worker_id: &WorkerId) -> Option<WorkerStatus> {
        self.get(worker_id).map(|slot| slot.lock().state.status)
    }

    pub fn state(&self, worker_id: &WorkerId) -> Option<WorkerState> {
        self.get(worker_id).map(|slot| slot.lock().state.clone())
    }

    pub fn states(&self) -> Vec<WorkerState> {
        let slots: Vec<SlotHandle> = self.slots.read().values().cloned().collect();
        let mut states: Vec<WorkerState> = slots.iter().map(|s| s.lock().state.clone()).collect();
        states.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        states
    }

    pub fn counts(&self) -> StatusCounts {
        let slots: Vec<SlotHandle> = self.slots.read().values().cloned().collect();
        let mut counts = StatusCounts::default();
        for slot in slots {
            counts.add(slot.lock().state.status);
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
