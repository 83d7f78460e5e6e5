use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The five operations the gateway exposes against the archive.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    List,
    Create,
    Restore,
    Delete,
    Download,
}

impl OperationKind {
    /// Create and Restore are the long-running kinds that get tracked.
    pub fn is_long_running(self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::Restore)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}

/// Snapshot of one Create or Restore run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    pub state: OperationState,
    pub target: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl OperationRecord {
    pub fn running(kind: OperationKind, target: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: OperationState::Running,
            target,
            started_at: Utc::now(),
            finished_at: None,
            message: None,
        }
    }

    /// Moves a running record into a terminal state. Terminal records are left alone.
    pub fn finish(&mut self, succeeded: bool, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = if succeeded {
            OperationState::Succeeded
        } else {
            OperationState::Failed
        };
        self.finished_at = Some(Utc::now());
        self.message = Some(message.into());
    }
}
