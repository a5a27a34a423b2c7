//! Typed project settings and the resolved context handed to the executor.

use crate::cadence::Cadence;
use crate::retention::RetentionPolicy;
use crate::utils::errors::BackupError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Database engines a project can back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbEngine {
    Mysql,
    Mariadb,
    Postgres,
    Mongodb,
}

impl DbEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::Mysql => "mysql",
            DbEngine::Mariadb => "mariadb",
            DbEngine::Postgres => "postgres",
            DbEngine::Mongodb => "mongodb",
        }
    }

    /// Whether a password may be omitted in favour of host-level trust.
    pub fn allows_trust_auth(&self) -> bool {
        matches!(self, DbEngine::Postgres)
    }

    /// Administrative account assumed when trust auth is used without a user.
    pub fn default_admin_user(&self) -> Option<&'static str> {
        match self {
            DbEngine::Postgres => Some("postgres"),
            _ => None,
        }
    }

    /// Mongo dumps a directory; the others write a single file.
    pub fn dumps_directory(&self) -> bool {
        matches!(self, DbEngine::Mongodb)
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbEngine {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DbEngine::Mysql),
            "mariadb" => Ok(DbEngine::Mariadb),
            "postgres" | "postgresql" => Ok(DbEngine::Postgres),
            "mongodb" | "mongo" => Ok(DbEngine::Mongodb),
            other => Err(BackupError::Validation(format!(
                "unknown DB_TYPE '{other}' (expected mysql, mariadb, postgres or mongodb)"
            ))),
        }
    }
}

/// Where artifacts end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Local,
    Cloud,
    Both,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Cloud => "cloud",
            StorageMode::Both => "both",
        }
    }

    pub fn includes_cloud(&self) -> bool {
        matches!(self, StorageMode::Cloud | StorageMode::Both)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageMode::Local),
            "cloud" => Ok(StorageMode::Cloud),
            "both" => Ok(StorageMode::Both),
            other => Err(BackupError::Validation(format!(
                "unknown BACKUP_TYPE '{other}' (expected local, cloud or both)"
            ))),
        }
    }
}

/// Provider-specific remote target. Each variant carries what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudTarget {
    S3 {
        bucket: String,
        prefix: String,
        region: Option<String>,
        profile: Option<String>,
        endpoint_url: Option<String>,
    },
    R2 {
        bucket: String,
        prefix: String,
        account_id: String,
        profile: Option<String>,
    },
}

impl CloudTarget {
    pub fn provider(&self) -> &'static str {
        match self {
            CloudTarget::S3 { .. } => "s3",
            CloudTarget::R2 { .. } => "r2",
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            CloudTarget::S3 { bucket, .. } | CloudTarget::R2 { bucket, .. } => bucket,
        }
    }

    /// Project prefix inside the bucket, without slashes at either end.
    pub fn prefix(&self) -> &str {
        match self {
            CloudTarget::S3 { prefix, .. } | CloudTarget::R2 { prefix, .. } => prefix,
        }
    }

    /// Key prefix holding one cadence's artifacts, ending in `/`.
    pub fn cadence_prefix(&self, cadence: Cadence) -> String {
        if self.prefix().is_empty() {
            format!("{}/", cadence.as_str())
        } else {
            format!("{}/{}/", self.prefix(), cadence.as_str())
        }
    }

    pub fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    /// `None` only for engines relying on host-level trust
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved, immutable settings for one project run.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub source: PathBuf,
    pub raw_name: String,
    pub name: String,
    pub engine: DbEngine,
    pub databases: Vec<String>,
    pub credentials: Credentials,
    pub storage: StorageMode,
    pub cloud: Option<CloudTarget>,
    pub local_root: PathBuf,
    /// Operator-supplied root outside the global base
    pub custom_local_root: bool,
    pub work_dir: PathBuf,
    pub retention: RetentionPolicy,
}

impl ProjectContext {
    pub fn cadence_dir(&self, cadence: Cadence) -> PathBuf {
        self.local_root.join(cadence.as_str())
    }
}
