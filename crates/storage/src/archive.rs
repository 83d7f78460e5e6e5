use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use prms_backup_core::{has_artifact_extension, BackupArtifact, BackupError, Result};
use tracing::{debug, info, warn};

use crate::probe::{is_busy_error, LockProbe, WriteOpenProbe};

/// How often, and how patiently, Delete retries a busy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based): 500, 1000, 1500 ms with the defaults.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

/// The archive directory: the only index of which backups exist.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    probe: Arc<dyn LockProbe>,
    retry: RetryPolicy,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            probe: Arc::new(WriteOpenProbe),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lock_probe(mut self, probe: Arc<dyn LockProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifacts in the archive, newest first. Creates the directory when missing.
    pub fn list(&self) -> Result<Vec<BackupArtifact>> {
        self.ensure_root()?;

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !has_artifact_extension(&name) {
                continue;
            }
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(err) => {
                    debug!(filename = %name, error = %err, "skipping unreadable archive entry");
                    continue;
                }
            };
            artifacts.push(artifact_from_metadata(name, &meta)?);
        }

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(artifacts)
    }

    /// Metadata for a single artifact.
    pub fn stat(&self, filename: &str) -> Result<BackupArtifact> {
        let path = self.resolve(filename)?;
        let meta = fs::metadata(&path).map_err(|err| classify_io(err, filename))?;
        artifact_from_metadata(filename.to_owned(), &meta)
    }

    /// Byte stream and declared length for a download.
    pub async fn open(&self, filename: &str) -> Result<(tokio::fs::File, u64)> {
        let path = self.resolve(filename)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| classify_io(err, filename))?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Full artifact content.
    pub fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve(filename)?;
        fs::read(&path).map_err(|err| classify_io(err, filename))
    }

    /// Creates a new, empty artifact file for a dump to write into. Never
    /// overwrites an existing artifact.
    pub fn reserve(&self, filename: &str) -> Result<(File, PathBuf)> {
        validate_filename(filename)?;
        self.ensure_root()?;

        let path = self.root.join(filename);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(|err| classify_io(err, filename))?;
        debug!(path = %path.display(), "reserved artifact file");
        Ok((file, path))
    }

    /// Removes an artifact, retrying while another process holds it open.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.resolve(filename)?;

        let dir = path.parent().unwrap_or(&self.root);
        if fs::metadata(dir)?.permissions().readonly() {
            return Err(BackupError::PermissionDenied(format!(
                "backup directory {} is not writable",
                dir.display()
            )));
        }

        let mut retry = 0;
        loop {
            if !self.probe.is_busy(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!(filename, "backup file deleted");
                        return Ok(());
                    }
                    Err(err) if is_busy_error(&err) => {}
                    Err(err) => return Err(classify_io(err, filename)),
                }
            }

            if retry >= self.retry.retries {
                warn!(filename, attempts = retry + 1, "backup file still locked, giving up");
                return Err(BackupError::Locked(filename.to_owned()));
            }
            retry += 1;
            let delay = self.retry.delay_for(retry);
            warn!(
                filename,
                retry,
                delay_ms = delay.as_millis() as u64,
                "backup file is busy, retrying delete"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn ensure_root(&self) -> Result<()> {
        if self.root.is_dir() {
            return Ok(());
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.root).map_err(|err| match err.kind() {
            io::ErrorKind::PermissionDenied => BackupError::PermissionDenied(format!(
                "cannot create backup directory {}",
                self.root.display()
            )),
            _ => BackupError::Io(err),
        })?;
        info!(root = %self.root.display(), "created backup directory");
        Ok(())
    }

    /// Path of an existing artifact entry inside the archive directory. The
    /// entry itself may be a symlink, but its target must be a regular file
    /// inside the archive too.
    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;

        let root = fs::canonicalize(&self.root).map_err(|err| classify_io(err, filename))?;
        let entry = root.join(filename);
        let target = fs::canonicalize(&entry).map_err(|err| classify_io(err, filename))?;
        if !target.starts_with(&root) {
            warn!(filename, resolved = %target.display(), "artifact resolves outside the backup directory");
            return Err(BackupError::InvalidTarget(filename.to_owned()));
        }
        if !target.is_file() {
            return Err(BackupError::InvalidTarget(filename.to_owned()));
        }
        Ok(entry)
    }
}

/// Only a single plain file name is accepted; separators of either platform,
/// `..` and absolute paths are rejected before touching the filesystem. Names
/// must also be safe to quote in a `Content-Disposition` header.
fn validate_filename(filename: &str) -> Result<()> {
    let invalid = || BackupError::InvalidTarget(filename.to_owned());
    if filename.is_empty()
        || filename.contains(['/', '\\', '"'])
        || filename.chars().any(char::is_control)
    {
        return Err(invalid());
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

fn classify_io(err: io::Error, filename: &str) -> BackupError {
    match err.kind() {
        io::ErrorKind::NotFound => BackupError::NotFound(filename.to_owned()),
        io::ErrorKind::PermissionDenied => BackupError::PermissionDenied(filename.to_owned()),
        _ => BackupError::Io(err),
    }
}

fn artifact_from_metadata(filename: String, meta: &fs::Metadata) -> Result<BackupArtifact> {
    let modified = meta.modified()?;
    Ok(BackupArtifact {
        filename,
        size_bytes: meta.len(),
        created_at: DateTime::<Local>::from(modified),
    })
}
