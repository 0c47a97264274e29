use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use vigil_types::{EventKind, SupervisionEvent, VigilResult, WorkerId};

use super::writer::{PendingWrite, PersistenceWriter, WriteStatus};

/// Append-only log of every classification, transition and recovery
/// decision. Shares the profile store's buffered writer.
pub struct Journal {
    writer: Arc<PersistenceWriter>,
    appended: AtomicU64,
}

impl Journal {
    pub fn new(writer: Arc<PersistenceWriter>) -> Self {
        Self {
            writer,
            appended: AtomicU64::new(0),
        }
    }

    pub async fn append(&self, event: SupervisionEvent) -> WriteStatus {
        debug!("journal {}: {:?}", event.worker_id, event.kind);
        self.appended.fetch_add(1, Ordering::Relaxed);
        self.writer.submit(PendingWrite::Event(event)).await
    }

    pub async fn record(&self, worker_id: &WorkerId, kind: EventKind) -> WriteStatus {
        self.append(SupervisionEvent::new(worker_id.clone(), kind)).await
    }

    /// Workers whose last escalation in the persisted journal was never
    /// followed by a reset.
    pub async fn escalated_workers(&self) -> VigilResult<Vec<WorkerId>> {
        let events = self.writer.backend().load_events().await?;
        Ok(unresolved_escalations(&events).into_iter().collect())
    }

    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}

fn unresolved_escalations(events: &[SupervisionEvent]) -> BTreeSet<WorkerId> {
    let mut escalated = BTreeSet::new();
    for event in events {
        match event.kind {
            EventKind::Escalated { .. } => {
                escalated.insert(event.worker_id.clone());
            }
            EventKind::Reset => {
                escalated.remove(&event.worker_id);
            }
            _ => {}
        }
    }
    escalated
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(id: &str, kind: EventKind) -> SupervisionEvent {
        SupervisionEvent::new(WorkerId::new(id), kind)
    }

    #[test]
    fn test_reset_clears_earlier_escalation() {
        let events = vec![
            event("w-1", EventKind::Escalated { attempt_id: Uuid::new_v4() }),
            event("w-2", EventKind::Escalated { attempt_id: Uuid::new_v4() }),
            event("w-1", EventKind::Reset),
            event("w-3", EventKind::Reset),
            event("w-3", EventKind::Escalated { attempt_id: Uuid::new_v4() }),
        ];

        let open: Vec<WorkerId> = unresolved_escalations(&events).into_iter().collect();
        assert_eq!(open, vec![WorkerId::new("w-2"), WorkerId::new("w-3")]);
    }
}
