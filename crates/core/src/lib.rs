pub mod artifact;
pub mod error;
pub mod operation;
pub mod statements;

pub use artifact::{artifact_filename, has_artifact_extension, BackupArtifact, ARTIFACT_EXTENSION};
pub use error::{BackupError, Result};
pub use operation::{OperationKind, OperationRecord, OperationState};
pub use statements::{split_statements, Dialect};
