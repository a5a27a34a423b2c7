//! Configuration management for the backup orchestrator.
//!
//! Global settings only: where things live on disk, which binaries to call
//! and how long the working directory keeps leftovers. Per-project settings
//! come from the project files listed by the manifest.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Top-level manifest listing the active project files
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Global local-backup base; projects get `<base>/<name>` unless overridden
    #[serde(default = "default_backup_base")]
    pub backup_base: PathBuf,

    /// Global ephemeral-working base; projects always get `<base>/<name>_temp`
    #[serde(default = "default_temp_base")]
    pub temp_base: PathBuf,

    /// Directory receiving the unique-project audit file
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,

    /// Directory holding one advisory lock file per cadence
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tar")]
    pub tar: String,

    #[serde(default = "default_aws")]
    pub aws: String,

    #[serde(default = "default_mysqldump")]
    pub mysqldump: String,

    #[serde(default = "default_mariadb_dump")]
    pub mariadb_dump: String,

    #[serde(default = "default_pg_dump")]
    pub pg_dump: String,

    #[serde(default = "default_mongodump")]
    pub mongodump: String,

    /// Upper bound for any single external invocation (unset = wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Age after which leftovers in a project's working directory are swept
    #[serde(default = "default_temp_retention_minutes")]
    pub temp_retention_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_manifest() -> PathBuf {
    PathBuf::from("/etc/backup-orchestrator/projects.conf")
}

fn default_backup_base() -> PathBuf {
    PathBuf::from("/var/backups/databases")
}

fn default_temp_base() -> PathBuf {
    PathBuf::from("/var/tmp/backup-orchestrator")
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("/var/lib/backup-orchestrator")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/lock/backup-orchestrator")
}

fn default_tar() -> String {
    "tar".to_string()
}

fn default_aws() -> String {
    "aws".to_string()
}

fn default_mysqldump() -> String {
    "mysqldump".to_string()
}

fn default_mariadb_dump() -> String {
    "mariadb-dump".to_string()
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

fn default_mongodump() -> String {
    "mongodump".to_string()
}

fn default_temp_retention_minutes() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            backup_base: default_backup_base(),
            temp_base: default_temp_base(),
            audit_dir: default_audit_dir(),
            lock_dir: default_lock_dir(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tar: default_tar(),
            aws: default_aws(),
            mysqldump: default_mysqldump(),
            mariadb_dump: default_mariadb_dump(),
            pg_dump: default_pg_dump(),
            mongodump: default_mongodump(),
            timeout_secs: None,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            temp_retention_minutes: default_temp_retention_minutes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
