use chrono::{DateTime, Local};
use serde::Serialize;

/// Extension carried by every artifact in the archive directory.
pub const ARTIFACT_EXTENSION: &str = "sql";

const FILENAME_PREFIX: &str = "backup_";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A single dump file in the archive directory.
///
/// Serialized as `{filename, size, created}`, the payload shape callers of the
/// `list` and `backup` actions consume.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupArtifact {
    pub filename: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "created", serialize_with = "serialize_created")]
    pub created_at: DateTime<Local>,
}

/// Artifact filename for a dump started at `now`: `backup_YYYY-MM-DD_HH-mm-ss.sql`.
pub fn artifact_filename(now: DateTime<Local>) -> String {
    format!(
        "{FILENAME_PREFIX}{}.{ARTIFACT_EXTENSION}",
        now.format(TIMESTAMP_FORMAT)
    )
}

/// Whether a directory entry name looks like something the archive lists.
pub fn has_artifact_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == ARTIFACT_EXTENSION)
}

fn serialize_created<S>(created: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&created.format("%Y-%m-%d %H:%M:%S"))
}
