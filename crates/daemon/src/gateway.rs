use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use prms_backup_core::{BackupError, Result};
use prms_backup_engine::BackupOrchestrator;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Whether an action arrived as a query (read) or as a form submission (write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The one response shape every action answers with, download aside.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: None,
        }
    }
}

pub enum GatewayReply {
    Envelope(Envelope),
    /// Raw artifact bytes, sent as an attachment instead of an envelope.
    Download {
        filename: String,
        file: tokio::fs::File,
        len: u64,
    },
}

impl From<Envelope> for GatewayReply {
    fn from(envelope: Envelope) -> Self {
        GatewayReply::Envelope(envelope)
    }
}

/// Routes action names to the archive and the orchestrator and renders every
/// outcome, failures included, as an envelope.
#[derive(Clone)]
pub struct OperationGateway {
    orchestrator: BackupOrchestrator,
    timeout: Option<Duration>,
}

impl OperationGateway {
    pub fn new(orchestrator: BackupOrchestrator) -> Self {
        Self {
            orchestrator,
            timeout: None,
        }
    }

    /// Stop waiting on Create and Restore after `timeout`. The work itself is
    /// not aborted.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn dispatch(
        &self,
        method: Method,
        action: &str,
        params: &HashMap<String, String>,
    ) -> GatewayReply {
        match self.route(method, action, params).await {
            Ok(reply) => reply,
            Err(err) => {
                match &err {
                    BackupError::InvalidAction(_) | BackupError::MissingParameter(_) => {
                        info!(action, ?method, error = %err, "rejected request");
                    }
                    _ => {
                        warn!(action, ?method, error = %err, "operation failed");
                    }
                }
                Envelope::failure(err.to_string()).into()
            }
        }
    }

    async fn route(
        &self,
        method: Method,
        action: &str,
        params: &HashMap<String, String>,
    ) -> Result<GatewayReply> {
        let store = self.orchestrator.store();
        match (method, action) {
            (Method::Read, "list") => {
                let files = store.list()?;
                Ok(Envelope::success("Backup files retrieved successfully", Some(json!(files))).into())
            }
            (Method::Read, "size") => {
                let size = match self.orchestrator.database_size().await {
                    Ok(size) => size,
                    Err(err) => {
                        warn!(error = %err, "database size estimate failed, reporting 0");
                        0
                    }
                };
                Ok(Envelope::success("Database size retrieved successfully", Some(json!(size))).into())
            }
            (Method::Read, "download") => {
                let filename = required_file(params)?;
                let (file, len) = store.open(filename).await?;
                info!(filename, len, "streaming backup download");
                Ok(GatewayReply::Download {
                    filename: filename.to_owned(),
                    file,
                    len,
                })
            }
            (Method::Read, "status") => {
                let tracker = self.orchestrator.tracker();
                let state = tracker.state().await;
                let operation = tracker.snapshot().await;
                let data = json!({ "state": state, "operation": operation });
                Ok(Envelope::success("Operation status retrieved successfully", Some(data)).into())
            }
            (Method::Write, "backup" | "create") => {
                let orchestrator = self.orchestrator.clone();
                let artifact = self.supervise(async move { orchestrator.create().await }).await?;
                Ok(Envelope::success("Backup created successfully", Some(json!(artifact))).into())
            }
            (Method::Write, "restore") => {
                let filename = required_file(params)?.to_owned();
                let orchestrator = self.orchestrator.clone();
                self.supervise(async move { orchestrator.restore(&filename).await })
                    .await?;
                Ok(Envelope::success("Database restored successfully", None).into())
            }
            (Method::Write, "delete") => {
                let filename = required_file(params)?;
                store.delete(filename).await?;
                Ok(Envelope::success("Backup file deleted successfully", None).into())
            }
            _ => Err(BackupError::InvalidAction(action.to_owned())),
        }
    }

    /// Runs a long operation on its own task so a dropped request cannot cut
    /// it short, optionally giving up on waiting after the configured timeout.
    async fn supervise<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(work);
        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "stopped waiting for operation");
                    return Err(BackupError::TimedOut(limit.as_secs()));
                }
            },
            None => handle.await,
        };
        joined.map_err(|err| BackupError::Io(std::io::Error::other(err)))?
    }
}

fn required_file(params: &HashMap<String, String>) -> Result<&str> {
    params
        .get("file")
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .ok_or(BackupError::MissingParameter("Filename"))
}
