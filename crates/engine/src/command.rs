use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use tokio::process::Command;

use crate::config::{DatabaseConfig, MysqlConfig};

/// Flags asking mysqldump for a consistent, lock-free, binary-safe snapshot.
const MYSQLDUMP_FLAGS: &[&str] = &[
    "--single-transaction",
    "--quick",
    "--lock-tables=false",
    "--routines",
    "--triggers",
    "--events",
    "--hex-blob",
    "--default-character-set=utf8mb4",
];

const MYSQL_PASSWORD_ENV: &str = "MYSQL_PWD";

/// A fully built dump engine invocation. Arguments are passed as a vector,
/// never through a shell, and the database password travels in the
/// environment rather than in argv.
#[derive(Clone)]
pub struct DumpInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    envs: Vec<(String, String)>,
}

impl DumpInvocation {
    /// Runs `engine` directly against the configured database.
    pub fn direct(engine: PathBuf, database: &DatabaseConfig) -> Self {
        let mut invocation = Self {
            program: engine,
            args: Vec::new(),
            envs: Vec::new(),
        };
        invocation.push_engine_args(database);
        invocation
    }

    /// Runs `engine` inside `container` via `docker exec`. The password is
    /// forwarded by name so it never appears in the docker command line.
    pub fn in_container(docker: PathBuf, container: &str, engine: &str, database: &DatabaseConfig) -> Self {
        let mut invocation = Self {
            program: docker,
            args: vec!["exec".into()],
            envs: Vec::new(),
        };
        if matches!(database, DatabaseConfig::Mysql(_)) {
            invocation.args.push("-e".into());
            invocation.args.push(MYSQL_PASSWORD_ENV.into());
        }
        invocation.args.push(container.into());
        invocation.args.push(engine.into());
        invocation.push_engine_args(database);
        invocation
    }

    fn push_engine_args(&mut self, database: &DatabaseConfig) {
        match database {
            DatabaseConfig::Mysql(MysqlConfig {
                host,
                port,
                username,
                password,
                database: schema,
            }) => {
                let port = port.to_string();
                self.args.extend(MYSQLDUMP_FLAGS.iter().map(OsString::from));
                self.args.extend(
                    [
                        "-h",
                        host.as_str(),
                        "-P",
                        port.as_str(),
                        "-u",
                        username.as_str(),
                        schema.as_str(),
                    ]
                    .map(OsString::from),
                );
                self.envs
                    .push((MYSQL_PASSWORD_ENV.to_owned(), password.clone()));
            }
            DatabaseConfig::Sqlite(sqlite) => {
                self.args.push(sqlite.path.clone().into_os_string());
                self.args.push(".dump".into());
            }
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }
}

impl fmt::Debug for DumpInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "envs",
                &self.envs.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
