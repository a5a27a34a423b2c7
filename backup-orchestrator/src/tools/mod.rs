//! External collaborators: database dump utilities, the archiver and the
//! cloud object-storage client.
//!
//! The pipeline only decides whether, what and in which order to call them.
//! Each concern sits behind a trait so the pipeline can run against fakes.

pub mod archive;
pub mod cloud;
pub mod dump;
pub mod process;

use crate::config::ToolsConfig;
use crate::project::model::{CloudTarget, DbEngine, ProjectContext};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

pub use archive::TarArchiver;
pub use cloud::AwsCli;
pub use dump::CommandDumper;

/// Produces a logical dump of one database.
#[allow(async_fn_in_trait)]
pub trait Dumper {
    /// Fails with `Dependency` when the engine's dump tool is unavailable.
    fn check(&self, engine: DbEngine) -> Result<()>;

    /// Write a dump of `database` to `target` (a file, or a directory for
    /// engines that dump directories).
    async fn dump(&self, project: &ProjectContext, database: &str, target: &Path) -> Result<()>;
}

/// Turns a dump file or directory into a single compressed archive.
#[allow(async_fn_in_trait)]
pub trait Archiver {
    fn check(&self) -> Result<()>;

    /// File extension of produced archives, without the leading dot.
    fn extension(&self) -> &'static str;

    async fn compress(&self, source: &Path, archive: &Path) -> Result<()>;
}

/// How a local cadence directory is pushed to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Push new files and delete remote objects no longer present locally
    Mirror,
    /// Push new files, never delete
    UploadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Remote bucket operations.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    fn check(&self) -> Result<()>;

    /// The bucket exists and the credentials can reach it.
    async fn bucket_exists(&self, target: &CloudTarget) -> Result<()>;

    /// A zero-byte marker can be created and read back under the target
    /// prefix. Reaching the bucket does not imply write access there.
    async fn verify_writable(&self, target: &CloudTarget) -> Result<()>;

    async fn sync(&self, target: &CloudTarget, local_dir: &Path, prefix: &str, mode: SyncMode)
        -> Result<()>;

    async fn list(&self, target: &CloudTarget, prefix: &str) -> Result<Vec<RemoteObject>>;

    async fn delete(&self, target: &CloudTarget, key: &str) -> Result<()>;
}

/// Everything the pipeline shells out to.
pub struct Tools<D, A, S> {
    pub dumper: D,
    pub archiver: A,
    pub store: S,
}

impl Tools<CommandDumper, TarArchiver, AwsCli> {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            dumper: CommandDumper::new(config),
            archiver: TarArchiver::new(config),
            store: AwsCli::new(config),
        }
    }
}
