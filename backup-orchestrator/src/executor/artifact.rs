//! One database's artifact as it moves through a cycle.

use std::fmt;
use std::path::PathBuf;

/// Furthest point an artifact reached. Only advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactStage {
    Init,
    FilenameGenerated,
    Dumped,
    Compressed,
    LocallyStored,
    CloudReplicated,
    Expired,
    Done,
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactStage::Init => "init",
            ArtifactStage::FilenameGenerated => "named",
            ArtifactStage::Dumped => "dumped",
            ArtifactStage::Compressed => "compressed",
            ArtifactStage::LocallyStored => "stored",
            ArtifactStage::CloudReplicated => "replicated",
            ArtifactStage::Expired => "expired",
            ArtifactStage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    Pending,
    Success,
    Failed(String),
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStatus::Pending => f.write_str("PENDING"),
            ArtifactStatus::Success => f.write_str("SUCCESS"),
            ArtifactStatus::Failed(_) => f.write_str("FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub project: String,
    pub database: String,
    pub base_name: String,
    pub dump_path: PathBuf,
    pub compressed_path: PathBuf,
    /// Set once the archive sits in the cadence directory
    pub local_path: Option<PathBuf>,
    /// Set once the archive was replicated
    pub cloud_key: Option<String>,
    pub stage: ArtifactStage,
    pub status: ArtifactStatus,
}

impl BackupArtifact {
    pub fn new(project: &str, database: &str) -> Self {
        Self {
            project: project.to_string(),
            database: database.to_string(),
            base_name: String::new(),
            dump_path: PathBuf::new(),
            compressed_path: PathBuf::new(),
            local_path: None,
            cloud_key: None,
            stage: ArtifactStage::Init,
            status: ArtifactStatus::Pending,
        }
    }

    pub fn advance(&mut self, stage: ArtifactStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Mark failed at the current stage. The first reason wins.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_failed() {
            self.status = ArtifactStatus::Failed(reason.into());
        }
    }

    pub fn succeed(&mut self) {
        if self.status == ArtifactStatus::Pending {
            self.advance(ArtifactStage::Done);
            self.status = ArtifactStatus::Success;
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ArtifactStatus::Failed(_))
    }

    pub fn is_success(&self) -> bool {
        self.status == ArtifactStatus::Success
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ArtifactStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Where the artifact ended up, for the summary.
    pub fn location(&self) -> String {
        match (&self.local_path, &self.cloud_key) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(key)) => key.clone(),
            (None, None) => "-".to_string(),
        }
    }
}
