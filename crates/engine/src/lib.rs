pub mod command;
pub mod config;
pub mod locator;
pub mod mysql_target;
pub mod orchestrator;
pub mod sqlite_target;
pub mod target;
pub mod tracker;

pub use config::{DatabaseConfig, DumpEngineConfig, MysqlConfig, SqliteConfig};
pub use locator::DumpEngineLocator;
pub use orchestrator::BackupOrchestrator;
pub use target::{DatabaseTarget, RestoreSession};
pub use tracker::OperationTracker;
