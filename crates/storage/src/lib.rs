mod archive;
pub mod probe;

pub use archive::{ArchiveStore, RetryPolicy};
pub use probe::{LockProbe, WriteOpenProbe};
