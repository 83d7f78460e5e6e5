use std::fmt;
use std::path::PathBuf;

use prms_backup_core::Dialect;

/// The operational database that gets dumped and restored.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Mysql(MysqlConfig),
    Sqlite(SqliteConfig),
}

impl DatabaseConfig {
    /// Bare command name used when no configured candidate resolves.
    pub fn default_dump_command(&self) -> &'static str {
        match self {
            DatabaseConfig::Mysql(_) => "mysqldump",
            DatabaseConfig::Sqlite(_) => "sqlite3",
        }
    }

    /// Quoting rules of the dumps this database produces.
    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseConfig::Mysql(_) => Dialect::Mysql,
            DatabaseConfig::Sqlite(_) => Dialect::Sqlite,
        }
    }
}

#[derive(Clone)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

/// Where to find the dump engine.
#[derive(Debug, Clone, Default)]
pub struct DumpEngineConfig {
    /// Probed in order; the first executable or PATH-resolvable entry wins.
    pub candidates: Vec<String>,
    /// Bare command name to fall back on. Defaults per database kind.
    pub command: Option<String>,
    /// Run the engine inside this container through `docker exec`.
    pub container: Option<String>,
}
