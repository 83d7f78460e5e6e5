use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use prms_backup_engine::{DatabaseConfig, DumpEngineConfig, MysqlConfig, SqliteConfig};
use prms_backup_storage::RetryPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub database: DatabaseSection,
    pub engine: EngineSection,
    pub operations: OperationsConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: Option<String>,
    pub delete_retries: Option<u32>,
    pub delete_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Mysql,
    Sqlite,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSection {
    pub kind: DatabaseKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    /// SQLite database file, only read when `kind = "sqlite"`.
    pub path: Option<String>,
}

impl std::fmt::Debug for DatabaseSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSection")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EngineSection {
    pub candidates: Vec<String>,
    pub command: Option<String>,
    pub container: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OperationsConfig {
    pub timeout_secs: Option<u64>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))
}

/// Environment variables win over the config file, which wins over defaults.
fn env_or(names: &[&str], configured: Option<String>) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
        .or(configured)
}

fn env_parse<T: std::str::FromStr>(name: &str, configured: Option<T>) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("{name} must be a number, got {raw:?}"),
        },
        _ => Ok(configured),
    }
}

/// Everything the daemon needs at startup, with overrides applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: String,
    pub archive_dir: PathBuf,
    pub retry: RetryPolicy,
    pub database: DatabaseConfig,
    pub engine: DumpEngineConfig,
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn resolve(self) -> Result<Settings> {
        let listen = env_or(&["PRMS_BACKUP_LISTEN"], self.server.listen)
            .unwrap_or_else(|| "127.0.0.1:8089".to_owned());

        let archive_dir = env_or(&["PRMS_BACKUP_DIR", "BACKUP_DIR"], self.archive.dir)
            .unwrap_or_else(|| "./backups".to_owned());

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            retries: self.archive.delete_retries.unwrap_or(defaults.retries),
            base_delay: self
                .archive
                .delete_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        };

        let db = self.database;
        let database = match db.kind {
            DatabaseKind::Mysql => DatabaseConfig::Mysql(MysqlConfig {
                host: env_or(&["DB_HOST"], db.host).unwrap_or_else(|| "localhost".to_owned()),
                port: env_parse("DB_PORT", db.port)?.unwrap_or(3306),
                username: env_or(&["DB_USER"], db.user).unwrap_or_else(|| "root".to_owned()),
                password: env_or(&["DB_PASSWORD"], db.password).unwrap_or_default(),
                database: env_or(&["DB_NAME"], db.name).unwrap_or_else(|| "prms_db".to_owned()),
            }),
            DatabaseKind::Sqlite => {
                let Some(path) = db.path else {
                    bail!("database.path is required when database.kind = \"sqlite\"");
                };
                DatabaseConfig::Sqlite(SqliteConfig {
                    path: PathBuf::from(path),
                })
            }
        };

        let engine = DumpEngineConfig {
            candidates: self.engine.candidates,
            command: self.engine.command,
            container: env_or(&["DB_CONTAINER_NAME"], self.engine.container),
        };

        let timeout = env_parse("PRMS_BACKUP_TIMEOUT_SECS", self.operations.timeout_secs)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Settings {
            listen,
            archive_dir: PathBuf::from(archive_dir),
            retry,
            database,
            engine,
            timeout,
        })
    }
}
