use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Local;
use prms_backup_core::{
    artifact_filename, split_statements, BackupArtifact, BackupError, OperationKind, Result,
};
use prms_backup_storage::ArchiveStore;
use tracing::{debug, error, info, warn};

use crate::command::DumpInvocation;
use crate::config::{DatabaseConfig, DumpEngineConfig};
use crate::locator::DumpEngineLocator;
use crate::target::{database_target, DatabaseTarget, RestoreSession};
use crate::tracker::OperationTracker;

const DOCKER_COMMAND: &str = "docker";

/// How much of a failed dump's standard output is echoed back in the error.
const OUTPUT_HEAD_BYTES: usize = 4096;

/// Drives Create and Restore end to end.
#[derive(Clone)]
pub struct BackupOrchestrator {
    store: ArchiveStore,
    database: DatabaseConfig,
    engine: DumpEngineConfig,
    target: Arc<dyn DatabaseTarget>,
    tracker: OperationTracker,
}

impl BackupOrchestrator {
    pub fn new(store: ArchiveStore, database: DatabaseConfig, engine: DumpEngineConfig) -> Self {
        let target = database_target(&database);
        Self {
            store,
            database,
            engine,
            target,
            tracker: OperationTracker::new(),
        }
    }

    /// Replaces the database Restore and `size` talk to.
    pub fn with_target(mut self, target: Arc<dyn DatabaseTarget>) -> Self {
        self.target = target;
        self
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    /// Dumps the whole database into a new artifact.
    pub async fn create(&self) -> Result<BackupArtifact> {
        let id = self.tracker.begin(OperationKind::Create, None).await;
        let outcome = self.run_create().await;
        self.tracker.finish(id, &outcome).await;
        outcome
    }

    /// Replays `filename` against the database, statement by statement.
    ///
    /// There is no transaction around the replay: statements before a failing
    /// one stay applied.
    pub async fn restore(&self, filename: &str) -> Result<()> {
        let id = self
            .tracker
            .begin(OperationKind::Restore, Some(filename.to_owned()))
            .await;
        let outcome = self.run_restore(filename).await;
        self.tracker.finish(id, &outcome).await;
        outcome
    }

    /// Estimated size of the database in bytes.
    pub async fn database_size(&self) -> Result<u64> {
        self.target.size_bytes().await.map_err(BackupError::Database)
    }

    fn invocation(&self) -> DumpInvocation {
        let command = self
            .engine
            .command
            .clone()
            .unwrap_or_else(|| self.database.default_dump_command().to_owned());

        match &self.engine.container {
            Some(container) => {
                let docker = DumpEngineLocator::new(vec![DOCKER_COMMAND.to_owned()], DOCKER_COMMAND)
                    .locate();
                DumpInvocation::in_container(docker, container, &command, &self.database)
            }
            None => {
                let engine = DumpEngineLocator::new(self.engine.candidates.clone(), command).locate();
                DumpInvocation::direct(engine, &self.database)
            }
        }
    }

    async fn run_create(&self) -> Result<BackupArtifact> {
        let now = Local::now();
        let filename = artifact_filename(now);

        let (file, path) = self.store.reserve(&filename).map_err(|err| match err {
            BackupError::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                BackupError::CreateFailed {
                    code: None,
                    output: format!("backup file {filename} already exists"),
                }
            }
            other => other,
        })?;

        let invocation = self.invocation();
        info!(filename = %filename, program = %invocation.program.display(), "starting database dump");

        let child = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                error!(filename = %filename, error = %err, "failed to start dump engine");
                BackupError::CreateFailed {
                    code: None,
                    output: format!("failed to start {}: {err}", invocation.program.display()),
                }
            })?;
        let output = child.wait_with_output().await?;

        let code = output.status.code();
        let written = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if !output.status.success() || written == 0 {
            let output = failure_output(&output.stderr, &path);
            error!(
                filename = %filename,
                exit_code = ?code,
                bytes_written = written,
                output = %output,
                "database dump failed, leaving partial file in place"
            );
            return Err(BackupError::CreateFailed { code, output });
        }

        let mut artifact = self.store.stat(&filename)?;
        artifact.created_at = now;
        info!(filename = %filename, size_bytes = artifact.size_bytes, "backup created");
        Ok(artifact)
    }

    async fn run_restore(&self, filename: &str) -> Result<()> {
        let bytes = self.store.read(filename)?;
        let script = String::from_utf8(bytes).map_err(|_| {
            BackupError::InvalidTarget(format!("{filename} is not UTF-8 text"))
        })?;
        let statements = split_statements(&script, self.database.dialect());
        info!(filename, statements = statements.len(), "restoring database");

        let mut session = self.target.connect().await.map_err(BackupError::Database)?;
        if let Err(err) = session.set_foreign_key_checks(false).await {
            close_session(session.as_mut()).await;
            return Err(BackupError::Database(err));
        }

        let mut failure = None;
        for (offset, statement) in statements.iter().enumerate() {
            let index = offset + 1;
            debug!(index, "executing statement");
            if let Err(err) = session.execute(statement).await {
                error!(filename, index, error = %format!("{err:#}"), "restore statement failed");
                failure = Some(BackupError::RestoreFailed {
                    index,
                    message: format!("{err:#}"),
                });
                break;
            }
        }

        let reenabled = session.set_foreign_key_checks(true).await;
        close_session(session.as_mut()).await;

        match (failure, reenabled) {
            (Some(failure), Err(err)) => {
                error!(error = %format!("{err:#}"), "could not re-enable foreign key checks");
                Err(failure)
            }
            (Some(failure), Ok(())) => Err(failure),
            (None, Err(err)) => Err(BackupError::Database(err)),
            (None, Ok(())) => {
                info!(filename, statements = statements.len(), "database restored");
                Ok(())
            }
        }
    }
}

async fn close_session(session: &mut dyn RestoreSession) {
    if let Err(err) = session.close().await {
        warn!(error = %format!("{err:#}"), "closing restore connection failed");
    }
}

/// Standard error followed by the head of whatever the engine wrote to stdout.
fn failure_output(stderr: &[u8], artifact: &Path) -> String {
    let mut output = String::from_utf8_lossy(stderr).trim().to_owned();
    if let Ok(written) = std::fs::read(artifact) {
        let head = &written[..written.len().min(OUTPUT_HEAD_BYTES)];
        let head = String::from_utf8_lossy(head);
        let head = head.trim();
        if !head.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(head);
        }
    }
    output
}
