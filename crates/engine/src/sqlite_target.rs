use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};

use crate::target::{DatabaseTarget, RestoreSession};

/// SQLite-backed restore target. rusqlite is blocking, so every call hops onto
/// the blocking pool.
pub struct SqliteTarget {
    db_path: PathBuf,
}

impl SqliteTarget {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

/// Opens an existing database. A missing file is an error rather than a new
/// empty database.
fn open_existing(db_path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(db_path, flags)
        .with_context(|| format!("open sqlite database {}", db_path.display()))
}

#[async_trait::async_trait]
impl DatabaseTarget for SqliteTarget {
    async fn connect(&self) -> Result<Box<dyn RestoreSession>> {
        let db_path = self.db_path.clone();
        let conn = tokio::task::spawn_blocking(move || open_existing(&db_path)).await??;
        Ok(Box::new(SqliteSession { conn: Some(conn) }))
    }

    async fn size_bytes(&self) -> Result<u64> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_existing(&db_path)?;
            let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            Ok(u64::try_from(pages * page_size)?)
        })
        .await?
    }
}

struct SqliteSession {
    conn: Option<Connection>,
}

impl SqliteSession {
    async fn with_conn<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.take().context("sqlite session already closed")?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await?;
        self.conn = Some(conn);
        Ok(result?)
    }
}

#[async_trait::async_trait]
impl RestoreSession for SqliteSession {
    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        self.with_conn(move |conn| conn.execute_batch(sql)).await
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        let statement = statement.to_owned();
        self.with_conn(move |conn| conn.execute_batch(&statement)).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| err).context("close sqlite database")?;
        }
        Ok(())
    }
}
