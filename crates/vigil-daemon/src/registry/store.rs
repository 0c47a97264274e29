use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vigil_types::{ProcessHandle, VigilError, VigilResult, WorkerDescriptor, WorkerId};

use super::discovery::DiscoverySource;

const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one [`WorkerRegistry::refresh`].
#[derive(Clone, Debug, Default)]
pub struct RegistryDelta {
    pub added: Vec<WorkerDescriptor>,
    pub removed: Vec<WorkerDescriptor>,
    pub rebound: Vec<WorkerDescriptor>,
}

impl RegistryDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.rebound.is_empty()
    }
}

struct Entry {
    descriptor: WorkerDescriptor,
    gone_ticks: u32,
    listed: bool,
    retired: bool,
}

#[derive(Default)]
struct RegistryInner {
    entries: BTreeMap<WorkerId, Entry>,
    pinned: HashSet<WorkerId>,
}

/// Owner of the known worker set.
///
/// A worker is only dropped once discovery no longer lists it, the prober
/// has reported its handle gone for `debounce_ticks` consecutive ticks, and
/// nobody holds a pin on it. Readers get a copy-on-read snapshot.
pub struct WorkerRegistry {
    source: Arc<dyn DiscoverySource>,
    debounce_ticks: u32,
    list_timeout: Duration,
    inner: Mutex<RegistryInner>,
    published: RwLock<Arc<Vec<WorkerDescriptor>>>,
}

impl WorkerRegistry {
    pub fn new(source: Arc<dyn DiscoverySource>, debounce_ticks: u32) -> Self {
        Self {
            source,
            debounce_ticks: debounce_ticks.max(1),
            list_timeout: DEFAULT_LIST_TIMEOUT,
            inner: Mutex::new(RegistryInner::default()),
            published: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Deadline for one `list_workers` call. A source that misses it counts
    /// as a failed refresh.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub async fn refresh(&self) -> VigilResult<RegistryDelta> {
        let listed = tokio::time::timeout(self.list_timeout, self.source.list_workers())
            .await
            .map_err(|_| {
                VigilError::Discovery(format!(
                    "{} did not answer within {:?}",
                    self.source.name(),
                    self.list_timeout
                ))
            })??;
        let mut delta = RegistryDelta::default();

        {
            let mut inner = self.inner.lock();
            for entry in inner.entries.values_mut() {
                entry.listed = false;
            }

            let mut seen = HashSet::new();
            for descriptor in listed {
                if !seen.insert(descriptor.worker_id.clone()) {
                    warn!("Discovery returned duplicate worker id {}", descriptor.worker_id);
                    continue;
                }

                // A restarted worker whose id is derived from its pid shows up
                // under a new id; keep the id we already track for that handle.
                let known_id = if inner.entries.contains_key(&descriptor.worker_id) {
                    Some(descriptor.worker_id.clone())
                } else {
                    inner
                        .entries
                        .iter()
                        .find(|(_, e)| {
                            !e.listed && e.descriptor.process_handle.same_process(&descriptor.process_handle)
                        })
                        .map(|(id, _)| id.clone())
                };

                match known_id.and_then(|id| inner.entries.get_mut(&id)) {
                    Some(entry) => {
                        entry.listed = true;
                        let moved = !entry.descriptor.process_handle.same_process(&descriptor.process_handle);
                        if moved {
                            debug!(
                                "Worker {} rebound {} -> {}",
                                entry.descriptor.worker_id,
                                entry.descriptor.process_handle,
                                descriptor.process_handle
                            );
                            entry.gone_ticks = 0;
                        }
                        entry.descriptor.process_handle = descriptor.process_handle;
                        if moved {
                            delta.rebound.push(entry.descriptor.clone());
                        }
                    }
                    None => {
                        info!(
                            "Discovered worker {} ({}, {})",
                            descriptor.worker_id, descriptor.worker_type, descriptor.process_handle
                        );
                        delta.added.push(descriptor.clone());
                        inner.entries.insert(
                            descriptor.worker_id.clone(),
                            Entry {
                                descriptor,
                                gone_ticks: 0,
                                listed: true,
                                retired: false,
                            },
                        );
                    }
                }
            }

            let debounce = self.debounce_ticks;
            let removable: Vec<WorkerId> = inner
                .entries
                .iter()
                .filter(|(id, e)| !e.listed && e.gone_ticks >= debounce && !inner.pinned.contains(*id))
                .map(|(id, _)| id.clone())
                .collect();

            for id in removable {
                if let Some(entry) = inner.entries.remove(&id) {
                    info!("Removed worker {} after {} gone tick(s)", id, entry.gone_ticks);
                    delta.removed.push(entry.descriptor);
                }
            }

            self.publish(&inner);
        }

        Ok(delta)
    }

    pub fn get(&self, worker_id: &WorkerId) -> VigilResult<WorkerDescriptor> {
        self.inner
            .lock()
            .entries
            .get(worker_id)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| VigilError::WorkerNotFound(worker_id.to_string()))
    }

    pub fn snapshot(&self) -> Arc<Vec<WorkerDescriptor>> {
        self.published.read().clone()
    }

    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a probe that found the handle gone; returns the streak length.
    pub fn confirm_gone(&self, worker_id: &WorkerId) -> u32 {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(worker_id) {
            Some(entry) => {
                entry.gone_ticks = entry.gone_ticks.saturating_add(1);
                entry.gone_ticks
            }
            None => 0,
        }
    }

    pub fn confirm_present(&self, worker_id: &WorkerId) {
        if let Some(entry) = self.inner.lock().entries.get_mut(worker_id) {
            entry.gone_ticks = 0;
        }
    }

    /// Keeps a worker registered while it has an open incident.
    pub fn pin(&self, worker_id: &WorkerId) {
        self.inner.lock().pinned.insert(worker_id.clone());
    }

    pub fn unpin(&self, worker_id: &WorkerId) {
        self.inner.lock().pinned.remove(worker_id);
    }

    pub fn is_pinned(&self, worker_id: &WorkerId) -> bool {
        self.inner.lock().pinned.contains(worker_id)
    }

    /// Points an existing worker at a freshly started process.
    pub fn rebind(&self, worker_id: &WorkerId, handle: ProcessHandle) -> bool {
        let mut inner = self.inner.lock();
        let rebound = match inner.entries.get_mut(worker_id) {
            Some(entry) => {
                entry.descriptor.process_handle = handle;
                entry.gone_ticks = 0;
                true
            }
            None => false,
        };
        if rebound {
            self.publish(&inner);
        }
        rebound
    }

    /// Marks a worker as intentionally stopped. It is no longer supervised
    /// and leaves the registry through the normal gone debounce.
    pub fn retire(&self, worker_id: &WorkerId) -> bool {
        let mut inner = self.inner.lock();
        inner.pinned.remove(worker_id);
        match inner.entries.get_mut(worker_id) {
            Some(entry) => {
                entry.retired = true;
                true
            }
            None => false,
        }
    }

    pub fn is_retired(&self, worker_id: &WorkerId) -> bool {
        self.inner
            .lock()
            .entries
            .get(worker_id)
            .map(|e| e.retired)
            .unwrap_or(false)
    }

    fn publish(&self, inner: &RegistryInner) {
        let descriptors: Vec<WorkerDescriptor> =
            inner.entries.values().map(|e| e.descriptor.clone()).collect();
        *self.published.write() = Arc::new(descriptors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RosterDiscovery;
    use crate::test_support::HangingDiscovery;

    fn worker(id: &str, pid: u32) -> WorkerDescriptor {
        WorkerDescriptor::new(WorkerId::new(id), "task-processor".into(), ProcessHandle::new(pid, 100))
    }

    fn setup(workers: Vec<WorkerDescriptor>) -> (Arc<RosterDiscovery>, WorkerRegistry) {
        let roster = Arc::new(RosterDiscovery::with_workers(workers));
        let registry = WorkerRegistry::new(roster.clone(), 2);
        (roster, registry)
    }

    #[tokio::test]
    async fn test_unanswered_listing_fails_refresh() {
        let registry =
            WorkerRegistry::new(Arc::new(HangingDiscovery), 2).with_list_timeout(Duration::from_millis(50));

        let result = tokio::time::timeout(Duration::from_secs(2), registry.refresh())
            .await
            .expect("refresh must respect its deadline");
        assert!(matches!(result, Err(VigilError::Discovery(_))));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_refresh_reports_additions() {
        let (_roster, registry) = setup(vec![worker("a", 1), worker("b", 2)]);

        let delta = registry.refresh().await.unwrap();
        assert_eq!(delta.added.len(), 2);
        assert!(delta.removed.is_empty());
        assert_eq!(registry.len(), 2);

        let delta = registry.refresh().await.unwrap();
        assert!(delta.is_empty());
        assert_eq!(registry.get(&WorkerId::new("a")).unwrap().process_handle.pid, 1);
        assert!(registry.get(&WorkerId::new("zzz")).is_err());
    }

    #[tokio::test]
    async fn test_removal_needs_two_gone_ticks() {
        let (roster, registry) = setup(vec![worker("a", 1)]);
        let id = WorkerId::new("a");
        registry.refresh().await.unwrap();

        roster.replace(Vec::new());

        // Missing from the scan but not yet confirmed gone by the prober.
        assert!(registry.refresh().await.unwrap().removed.is_empty());

        assert_eq!(registry.confirm_gone(&id), 1);
        assert!(registry.refresh().await.unwrap().removed.is_empty());

        assert_eq!(registry.confirm_gone(&id), 2);
        let delta = registry.refresh().await.unwrap();
        assert_eq!(delta.removed.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_present_probe_resets_debounce() {
        let (roster, registry) = setup(vec![worker("a", 1)]);
        let id = WorkerId::new("a");
        registry.refresh().await.unwrap();
        roster.replace(Vec::new());

        registry.confirm_gone(&id);
        registry.confirm_present(&id);
        assert_eq!(registry.confirm_gone(&id), 1);
        assert!(registry.refresh().await.unwrap().removed.is_empty());
    }

    #[tokio::test]
    async fn test_pinned_worker_is_kept() {
        let (roster, registry) = setup(vec![worker("a", 1)]);
        let id = WorkerId::new("a");
        registry.refresh().await.unwrap();
        roster.replace(Vec::new());

        registry.pin(&id);
        registry.confirm_gone(&id);
        registry.confirm_gone(&id);
        assert!(registry.refresh().await.unwrap().removed.is_empty());

        registry.unpin(&id);
        assert_eq!(registry.refresh().await.unwrap().removed.len(), 1);
    }

    #[tokio::test]
    async fn test_new_handle_for_known_id_is_rebound() {
        let (roster, registry) = setup(vec![worker("a", 1)]);
        registry.refresh().await.unwrap();

        roster.replace(vec![worker("a", 42)]);
        let delta = registry.refresh().await.unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(delta.rebound.len(), 1);
        assert_eq!(registry.get(&WorkerId::new("a")).unwrap().process_handle.pid, 42);
    }

    #[tokio::test]
    async fn test_rebound_handle_keeps_tracked_id() {
        let (roster, registry) = setup(vec![worker("task-processor-1", 1)]);
        let id = WorkerId::new("task-processor-1");
        registry.refresh().await.unwrap();

        assert!(registry.rebind(&id, ProcessHandle::new(77, 0)));
        roster.replace(vec![worker("task-processor-77", 77)]);

        let delta = registry.refresh().await.unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().process_handle.start_time, 100);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_ignored() {
        let (_roster, registry) = setup(vec![worker("a", 1), worker("a", 2)]);
        let delta = registry.refresh().await.unwrap();
        assert_eq!(delta.added.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_copy() {
        let (roster, registry) = setup(vec![worker("a", 1)]);
        registry.refresh().await.unwrap();
        let before = registry.snapshot();

        roster.upsert(worker("b", 2));
        registry.refresh().await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
