use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::progress::ProgressSnapshot;
use super::BatchSummary;
use crate::layout::DocumentKind;
use crate::verification::Actor;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Finished { summary: BatchSummary },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub batch_id: Uuid,
    pub semester_id: Uuid,
    pub kind: DocumentKind,
    pub progress: ProgressSnapshot,
    #[serde(flatten)]
    pub state: BatchState,
}

struct BatchEntry {
    semester_id: Uuid,
    kind: DocumentKind,
    requested_by: Actor,
    progress: watch::Receiver<ProgressSnapshot>,
    state: BatchState,
    finished_at: Option<Instant>,
}

impl BatchEntry {
    /// Only the requester and privileged roles may observe a batch; its archive carries
    /// every result the requester could see.
    fn visible_to(&self, viewer: &Actor) -> bool {
        viewer.id == self.requested_by.id || viewer.role.is_privileged()
    }
}

/// In-flight and recently finished batches, keyed by batch id. Each batch owns its own
/// progress channel; nothing is shared between entries.
pub struct BatchRegistry {
    batches: Mutex<HashMap<Uuid, BatchEntry>>,
    retention: Duration,
}

impl BatchRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, BatchEntry>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        batch_id: Uuid,
        semester_id: Uuid,
        kind: DocumentKind,
        requested_by: Actor,
        progress: watch::Receiver<ProgressSnapshot>,
    ) {
        self.lock().insert(
            batch_id,
            BatchEntry {
                semester_id,
                kind,
                requested_by,
                progress,
                state: BatchState::Running,
                finished_at: None,
            },
        );
    }

    pub fn subscribe(
        &self,
        batch_id: Uuid,
        viewer: &Actor,
    ) -> Option<watch::Receiver<ProgressSnapshot>> {
        self.lock()
            .get(&batch_id)
            .filter(|entry| entry.visible_to(viewer))
            .map(|entry| entry.progress.clone())
    }

    /// `None` when the batch is unknown, evicted, or not visible to `viewer`.
    pub fn status(&self, batch_id: Uuid, viewer: &Actor) -> Option<BatchStatus> {
        let batches = self.lock();
        let entry = batches.get(&batch_id).filter(|entry| entry.visible_to(viewer))?;
        let status = BatchStatus {
            batch_id,
            semester_id: entry.semester_id,
            kind: entry.kind,
            progress: *entry.progress.borrow(),
            state: entry.state.clone(),
        };
        Some(status)
    }

    pub fn complete(&self, batch_id: Uuid, outcome: Result<BatchSummary, String>) {
        if let Some(entry) = self.lock().get_mut(&batch_id) {
            entry.state = match outcome {
                Ok(summary) => BatchState::Finished { summary },
                Err(error) => BatchState::Failed { error },
            };
            entry.finished_at = Some(Instant::now());
        }
    }

    pub fn running(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| matches!(entry.state, BatchState::Running))
            .count()
    }

    /// Drops finished batches older than the retention window. Returns how many were removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let retention = self.retention;
        let mut batches = self.lock();
        let before = batches.len();
        batches.retain(|_, entry| {
            entry
                .finished_at
                .map_or(true, |finished| now.saturating_duration_since(finished) < retention)
        });
        before - batches.len()
    }

    pub fn spawn_eviction(registry: Arc<BatchRegistry>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_expired(Instant::now());
                if evicted > 0 {
                    debug!(evicted, "evicted finished export batches");
                }
            }
        })
    }
}
