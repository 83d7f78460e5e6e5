use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor, Row};

use crate::config::MysqlConfig;
use crate::target::{DatabaseTarget, RestoreSession};

/// MySQL-backed restore target.
pub struct MysqlTarget {
    options: MySqlConnectOptions,
    schema: String,
}

impl MysqlTarget {
    pub fn new(config: &MysqlConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .charset("utf8mb4");
        Self {
            options,
            schema: config.database.clone(),
        }
    }

    async fn open(&self) -> Result<MySqlConnection> {
        MySqlConnection::connect_with(&self.options)
            .await
            .with_context(|| format!("connect to mysql schema {}", self.schema))
    }
}

#[async_trait::async_trait]
impl DatabaseTarget for MysqlTarget {
    async fn connect(&self) -> Result<Box<dyn RestoreSession>> {
        let conn = self.open().await?;
        Ok(Box::new(MysqlSession { conn: Some(conn) }))
    }

    async fn size_bytes(&self) -> Result<u64> {
        let mut conn = self.open().await?;
        let row = conn
            .fetch_one(
                sqlx::query(
                    "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS UNSIGNED)
                     FROM information_schema.tables WHERE table_schema = ?",
                )
                .bind(&self.schema),
            )
            .await
            .context("query information_schema.tables")?;
        let size: u64 = row.try_get(0).context("decode schema size")?;
        conn.close().await.ok();
        Ok(size)
    }
}

struct MysqlSession {
    conn: Option<MySqlConnection>,
}

impl MysqlSession {
    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().context("mysql session already closed")
    }
}

#[async_trait::async_trait]
impl RestoreSession for MysqlSession {
    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "SET FOREIGN_KEY_CHECKS = 1"
        } else {
            "SET FOREIGN_KEY_CHECKS = 0"
        };
        self.conn()?
            .execute(sqlx::raw_sql(sql))
            .await
            .with_context(|| format!("run {sql}"))?;
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.conn()?.execute(sqlx::raw_sql(statement)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.context("close mysql connection")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connection settings for a disposable MySQL schema, taken from
    /// `PRMS_TEST_MYSQL_*`. Live tests skip when the host is unset.
    fn live_config() -> Option<MysqlConfig> {
        let host = std::env::var("PRMS_TEST_MYSQL_HOST").ok()?;
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_owned())
        };
        Some(MysqlConfig {
            host,
            port: var("PRMS_TEST_MYSQL_PORT", "3306").parse().unwrap(),
            username: var("PRMS_TEST_MYSQL_USER", "root"),
            password: var("PRMS_TEST_MYSQL_PASSWORD", ""),
            database: var("PRMS_TEST_MYSQL_DATABASE", "prms_test"),
        })
    }

    #[tokio::test]
    async fn closed_session_rejects_statements() {
        let mut session = MysqlSession { conn: None };
        let err = session.execute("SELECT 1").await.unwrap_err();
        assert!(err.to_string().contains("already closed"), "{err:#}");
        assert!(session.set_foreign_key_checks(false).await.is_err());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn live_session_toggles_foreign_keys_and_runs_statements() {
        let Some(config) = live_config() else {
            return;
        };
        let target = MysqlTarget::new(&config);

        let mut session = target.connect().await.unwrap();
        session.set_foreign_key_checks(false).await.unwrap();
        session
            .execute("DROP TABLE IF EXISTS prms_fk_child, prms_fk_parent")
            .await
            .unwrap();
        session
            .execute("CREATE TABLE prms_fk_parent (id INT PRIMARY KEY) ENGINE=InnoDB")
            .await
            .unwrap();
        session
            .execute(
                "CREATE TABLE prms_fk_child (id INT PRIMARY KEY, parent_id INT, \
                 FOREIGN KEY (parent_id) REFERENCES prms_fk_parent(id)) ENGINE=InnoDB",
            )
            .await
            .unwrap();
        session
            .execute("INSERT INTO prms_fk_child VALUES (1, 99)")
            .await
            .unwrap();

        session.set_foreign_key_checks(true).await.unwrap();
        assert!(session
            .execute("INSERT INTO prms_fk_child VALUES (2, 98)")
            .await
            .is_err());
        session
            .execute("DROP TABLE prms_fk_child, prms_fk_parent")
            .await
            .unwrap();
        session.close().await.unwrap();

        target.size_bytes().await.unwrap();
    }
}
