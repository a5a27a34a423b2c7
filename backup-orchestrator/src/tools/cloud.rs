//! Object storage through the AWS CLI. R2 speaks the same API through its
//! account endpoint.

use super::process::{self, find_executable, CommandFailure};
use super::{ObjectStore, RemoteObject, SyncMode};
use crate::config::ToolsConfig;
use crate::project::model::CloudTarget;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct AwsCli {
    program: String,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct ListObjectsOutput {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "LastModified")]
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HeadObjectOutput {
    #[serde(rename = "ContentLength", default)]
    content_length: u64,
}

impl AwsCli {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            program: config.aws.clone(),
            timeout: config.timeout(),
        }
    }

    /// `aws` with the provider's connection options applied.
    fn command(&self, target: &CloudTarget) -> Command {
        let mut cmd = Command::new(&self.program);
        match target {
            CloudTarget::S3 {
                region,
                profile,
                endpoint_url,
                ..
            } => {
                if let Some(profile) = profile {
                    cmd.arg("--profile").arg(profile);
                }
                if let Some(region) = region {
                    cmd.arg("--region").arg(region);
                }
                if let Some(endpoint) = endpoint_url {
                    cmd.arg("--endpoint-url").arg(endpoint);
                }
            }
            CloudTarget::R2 {
                account_id,
                profile,
                ..
            } => {
                if let Some(profile) = profile {
                    cmd.arg("--profile").arg(profile);
                }
                cmd.arg("--region")
                    .arg("auto")
                    .arg("--endpoint-url")
                    .arg(r2_endpoint(account_id));
            }
        }
        cmd
    }

    async fn run(&self, cmd: Command, what: &str) -> Result<std::process::Output> {
        process::run(cmd, self.timeout)
            .await
            .map_err(|e: CommandFailure| BackupError::Storage(format!("{what}: {e}")))
    }
}

pub fn r2_endpoint(account_id: &str) -> String {
    format!("https://{account_id}.r2.cloudflarestorage.com")
}

/// Key of the zero-byte marker used to prove write access.
pub fn marker_key(target: &CloudTarget, token: &str) -> String {
    if target.prefix().is_empty() {
        format!(".write-test-{token}")
    } else {
        format!("{}/.write-test-{token}", target.prefix())
    }
}

fn parse_listing(stdout: &[u8]) -> Result<Vec<RemoteObject>> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let listing: ListObjectsOutput = serde_json::from_str(&text)?;
    Ok(listing
        .contents
        .into_iter()
        .map(|o| RemoteObject {
            key: o.key,
            last_modified: o.last_modified,
        })
        .collect())
}

impl ObjectStore for AwsCli {
    fn check(&self) -> Result<()> {
        find_executable(&self.program)
            .map(|_| ())
            .ok_or_else(|| BackupError::Dependency(format!("cloud client '{}' not found", self.program)))
    }

    async fn bucket_exists(&self, target: &CloudTarget) -> Result<()> {
        let mut cmd = self.command(target);
        cmd.arg("s3api").arg("head-bucket").arg("--bucket").arg(target.bucket());
        self.run(cmd, &format!("bucket '{}' is not reachable", target.bucket()))
            .await?;
        Ok(())
    }

    async fn verify_writable(&self, target: &CloudTarget) -> Result<()> {
        let key = marker_key(target, &uuid::Uuid::new_v4().simple().to_string());

        let mut put = self.command(target);
        put.arg("s3api")
            .arg("put-object")
            .arg("--bucket")
            .arg(target.bucket())
            .arg("--key")
            .arg(&key);
        self.run(put, &format!("cannot write to {}", target.url(&key)))
            .await?;

        let mut head = self.command(target);
        head.arg("s3api")
            .arg("head-object")
            .arg("--bucket")
            .arg(target.bucket())
            .arg("--key")
            .arg(&key)
            .arg("--output")
            .arg("json");
        let out = self
            .run(head, &format!("marker {} not readable after write", target.url(&key)))
            .await?;
        let head: HeadObjectOutput = serde_json::from_slice(&out.stdout)?;
        if head.content_length != 0 {
            return Err(BackupError::Storage(format!(
                "marker {} has unexpected size {}",
                target.url(&key),
                head.content_length
            )));
        }

        let mut delete = self.command(target);
        delete
            .arg("s3api")
            .arg("delete-object")
            .arg("--bucket")
            .arg(target.bucket())
            .arg("--key")
            .arg(&key);
        if let Err(e) = self.run(delete, "marker cleanup").await {
            warn!(key = %key, "Failed to remove write-test marker: {}", e);
        }
        Ok(())
    }

    async fn sync(
        &self,
        target: &CloudTarget,
        local_dir: &Path,
        prefix: &str,
        mode: SyncMode,
    ) -> Result<()> {
        let mut cmd = self.command(target);
        cmd.arg("s3")
            .arg("sync")
            .arg(local_dir)
            .arg(target.url(prefix))
            .arg("--only-show-errors");
        if mode == SyncMode::Mirror {
            cmd.arg("--delete");
        }
        debug!(local = %local_dir.display(), remote = %target.url(prefix), ?mode, "Syncing to cloud");
        self.run(cmd, &format!("sync to {} failed", target.url(prefix)))
            .await?;
        Ok(())
    }

    async fn list(&self, target: &CloudTarget, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut cmd = self.command(target);
        cmd.arg("s3api")
            .arg("list-objects-v2")
            .arg("--bucket")
            .arg(target.bucket())
            .arg("--prefix")
            .arg(prefix)
            .arg("--output")
            .arg("json");
        let out = self
            .run(cmd, &format!("listing {} failed", target.url(prefix)))
            .await?;
        parse_listing(&out.stdout)
    }

    async fn delete(&self, target: &CloudTarget, key: &str) -> Result<()> {
        let mut cmd = self.command(target);
        cmd.arg("s3api")
            .arg("delete-object")
            .arg("--bucket")
            .arg(target.bucket())
            .arg("--key")
            .arg(key);
        self.run(cmd, &format!("deleting {} failed", target.url(key)))
            .await?;
        Ok(())
    }
}
