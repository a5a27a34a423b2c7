//! `tar -czf` archiver.

use super::process::{self, find_executable};
use super::Archiver;
use crate::config::ToolsConfig;
use crate::utils::errors::{BackupError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

pub struct TarArchiver {
    program: String,
    timeout: Option<Duration>,
}

impl TarArchiver {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            program: config.tar.clone(),
            timeout: config.timeout(),
        }
    }
}

impl Archiver for TarArchiver {
    fn check(&self) -> Result<()> {
        find_executable(&self.program)
            .map(|_| ())
            .ok_or_else(|| BackupError::Dependency(format!("archiver '{}' not found", self.program)))
    }

    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    async fn compress(&self, source: &Path, archive: &Path) -> Result<()> {
        let (Some(parent), Some(name)) = (source.parent(), source.file_name()) else {
            return Err(BackupError::Execution(format!(
                "cannot archive {}: no parent directory",
                source.display()
            )));
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg("-czf").arg(archive).arg("-C").arg(parent).arg(name);

        process::run(cmd, self.timeout).await.map_err(|e| {
            BackupError::Execution(format!("compressing {} failed: {e}", source.display()))
        })?;
        Ok(())
    }
}
