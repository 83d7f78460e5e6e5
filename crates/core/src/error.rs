use thiserror::Error;

/// Failures surfaced by the archive, the orchestrator and the gateway.
///
/// Only the gateway turns these into response envelopes; everything below it
/// returns them as-is.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup file does not exist: {0}")]
    NotFound(String),

    #[error("Invalid backup file: {0}")]
    InvalidTarget(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backup file {0} is locked by another process. Close any application using it and try again")]
    Locked(String),

    #[error("Failed to create backup (exit code {}): {output}", exit_code_display(.code))]
    CreateFailed { code: Option<i32>, output: String },

    #[error("Failed to restore database: statement {index} failed: {message}")]
    RestoreFailed { index: usize, message: String },

    #[error("Operation timed out after {0} seconds; it is still running in the background")]
    TimedOut(u64),

    #[error("Invalid action")]
    InvalidAction(String),

    #[error("{0} is required")]
    MissingParameter(&'static str),

    #[error("Database error: {0:#}")]
    Database(anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_owned(),
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = BackupError::CreateFailed {
            code: Some(2),
            output: "mysqldump: Got error: 1045".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create backup (exit code 2): mysqldump: Got error: 1045"
        );

        let err = BackupError::CreateFailed {
            code: None,
            output: "killed".to_owned(),
        };
        assert!(err.to_string().contains("exit code none"));

        assert_eq!(
            BackupError::InvalidAction("frobnicate".to_owned()).to_string(),
            "Invalid action"
        );
        assert_eq!(
            BackupError::MissingParameter("Filename").to_string(),
            "Filename is required"
        );
    }

    #[test]
    fn timeout_says_work_continues() {
        let msg = BackupError::TimedOut(30).to_string();
        assert!(msg.contains("30 seconds"));
        assert!(msg.contains("still running"));
    }

    #[test]
    fn restore_failure_names_statement_index() {
        let err = BackupError::RestoreFailed {
            index: 4,
            message: "no such table: nope".to_owned(),
        };
        assert!(err.to_string().contains("statement 4"));
    }
}
