use std::sync::Arc;

use anyhow::Result;

use crate::config::DatabaseConfig;
use crate::mysql_target::MysqlTarget;
use crate::sqlite_target::SqliteTarget;

/// The database Restore writes into and `size` reports on, implemented by
/// both MySQL and SQLite backends.
#[async_trait::async_trait]
pub trait DatabaseTarget: Send + Sync {
    /// Open a dedicated connection for one restore run.
    async fn connect(&self) -> Result<Box<dyn RestoreSession>>;

    /// Estimated on-disk size of the database in bytes.
    async fn size_bytes(&self) -> Result<u64>;
}

/// One connection, held for the whole statement loop so session settings
/// such as foreign-key checking stick.
#[async_trait::async_trait]
pub trait RestoreSession: Send {
    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()>;

    async fn execute(&mut self, statement: &str) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

pub fn database_target(config: &DatabaseConfig) -> Arc<dyn DatabaseTarget> {
    match config {
        DatabaseConfig::Mysql(mysql) => Arc::new(MysqlTarget::new(mysql)),
        DatabaseConfig::Sqlite(sqlite) => Arc::new(SqliteTarget::new(sqlite.path.clone())),
    }
}
