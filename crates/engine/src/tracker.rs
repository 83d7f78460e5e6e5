use std::sync::Arc;

use prms_backup_core::{OperationKind, OperationRecord, OperationState, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Remembers the most recent Create or Restore run so callers can poll it.
///
/// This only observes; it never refuses to start a second run.
#[derive(Debug, Clone, Default)]
pub struct OperationTracker {
    current: Arc<Mutex<Option<OperationRecord>>>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, kind: OperationKind, target: Option<String>) -> Uuid {
        let record = OperationRecord::running(kind, target);
        let id = record.id;
        let mut current = self.current.lock().await;
        if let Some(previous) = current.as_ref().filter(|r| !r.state.is_terminal()) {
            warn!(
                previous_id = %previous.id,
                previous_kind = ?previous.kind,
                "starting while another operation is still running"
            );
        }
        info!(operation_id = %id, ?kind, filename = record.target.as_deref(), "operation started");
        *current = Some(record);
        id
    }

    /// Records the outcome of run `id`. Ignored when a newer run has replaced it.
    pub async fn finish<T>(&self, id: Uuid, outcome: &Result<T>) {
        let mut current = self.current.lock().await;
        let Some(record) = current.as_mut().filter(|r| r.id == id) else {
            return;
        };
        match outcome {
            Ok(_) => record.finish(true, "completed"),
            Err(err) => record.finish(false, err.to_string()),
        }
        info!(operation_id = %id, state = ?record.state, "operation finished");
    }

    pub async fn snapshot(&self) -> Option<OperationRecord> {
        self.current.lock().await.clone()
    }

    pub async fn state(&self) -> OperationState {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(OperationState::Idle, |r| r.state)
    }
}
