//! Engine-specific dump commands.
//!
//! Passwords travel through the environment (`MYSQL_PWD`, `PGPASSWORD`) or a
//! 0600 config file (mongodump), never through the argument list.

use super::process::{self, find_executable};
use super::Dumper;
use crate::config::ToolsConfig;
use crate::project::model::{DbEngine, ProjectContext};
use crate::utils::errors::{BackupError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

pub struct CommandDumper {
    mysqldump: String,
    mariadb_dump: String,
    pg_dump: String,
    mongodump: String,
    timeout: Option<Duration>,
}

impl CommandDumper {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            mysqldump: config.mysqldump.clone(),
            mariadb_dump: config.mariadb_dump.clone(),
            pg_dump: config.pg_dump.clone(),
            mongodump: config.mongodump.clone(),
            timeout: config.timeout(),
        }
    }

    fn program(&self, engine: DbEngine) -> &str {
        match engine {
            DbEngine::Mysql => &self.mysqldump,
            DbEngine::Mariadb => &self.mariadb_dump,
            DbEngine::Postgres => &self.pg_dump,
            DbEngine::Mongodb => &self.mongodump,
        }
    }

    /// Build the dump command. Returns any credentials file that must be
    /// removed once the command finishes.
    fn command(
        &self,
        project: &ProjectContext,
        database: &str,
        target: &Path,
    ) -> Result<(Command, Option<PathBuf>)> {
        let creds = &project.credentials;
        let mut cmd = Command::new(self.program(project.engine));

        match project.engine {
            DbEngine::Mysql | DbEngine::Mariadb => {
                cmd.arg("--single-transaction")
                    .arg("--quick")
                    .arg("--routines")
                    .arg("--triggers")
                    .arg("--events");
                if let Some(host) = &creds.host {
                    cmd.arg("--host").arg(host);
                }
                if let Some(port) = creds.port {
                    cmd.arg("--port").arg(port.to_string());
                }
                cmd.arg("--user").arg(&creds.user);
                if let Some(password) = &creds.password {
                    cmd.env("MYSQL_PWD", password);
                }
                cmd.arg(format!("--result-file={}", target.display()))
                    .arg(database);
                Ok((cmd, None))
            }
            DbEngine::Postgres => {
                cmd.arg("--no-password");
                if let Some(host) = &creds.host {
                    cmd.arg("--host").arg(host);
                }
                if let Some(port) = creds.port {
                    cmd.arg("--port").arg(port.to_string());
                }
                cmd.arg("--username").arg(&creds.user);
                if let Some(password) = &creds.password {
                    cmd.env("PGPASSWORD", password);
                }
                cmd.arg("--file").arg(target).arg(database);
                Ok((cmd, None))
            }
            DbEngine::Mongodb => {
                if let Some(host) = &creds.host {
                    cmd.arg("--host").arg(host);
                }
                if let Some(port) = creds.port {
                    cmd.arg("--port").arg(port.to_string());
                }
                cmd.arg("--username")
                    .arg(&creds.user)
                    .arg("--authenticationDatabase")
                    .arg("admin");
                let mut secret = None;
                if let Some(password) = &creds.password {
                    let path = write_mongo_config(target, password)?;
                    cmd.arg(format!("--config={}", path.display()));
                    secret = Some(path);
                }
                cmd.arg("--db").arg(database).arg("--out").arg(target);
                Ok((cmd, secret))
            }
        }
    }
}

impl Dumper for CommandDumper {
    fn check(&self, engine: DbEngine) -> Result<()> {
        let program = self.program(engine);
        find_executable(program).map(|_| ()).ok_or_else(|| {
            BackupError::Dependency(format!("{engine} dump tool '{program}' not found"))
        })
    }

    async fn dump(&self, project: &ProjectContext, database: &str, target: &Path) -> Result<()> {
        let (cmd, secret) = self.command(project, database, target)?;
        info!(project = %project.name, database, engine = %project.engine, "Dumping database");

        let result = process::run(cmd, self.timeout).await;

        if let Some(path) = secret {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), "Failed to remove dump credentials file: {}", e);
            }
        }

        result.map(|_| ()).map_err(|e| {
            BackupError::Execution(format!("dump of '{database}' failed: {e}"))
        })
    }
}

/// mongodump reads the password from a YAML config file.
fn write_mongo_config(target: &Path, password: &str) -> Result<PathBuf> {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".auth.yaml");
    let path = target.with_file_name(name);

    let _ = std::fs::remove_file(&path);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&path)?;
    let escaped = password.replace('\\', "\\\\").replace('"', "\\\"");
    writeln!(file, "password: \"{escaped}\"")?;
    Ok(path)
}
