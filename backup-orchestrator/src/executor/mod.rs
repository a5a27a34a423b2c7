//! Backup cycle executor.
//!
//! Per database: name → dump → compress → store → local expiry. Per project,
//! once every database is done: replicate → cloud expiry → optional local
//! purge, then the working-directory sweep. A failure stops only the
//! database it belongs to.

pub mod artifact;
pub mod expiry;

use crate::cadence::Cadence;
use crate::naming::artifact_base_name;
use crate::project::model::{ProjectContext, StorageMode};
use crate::tools::{Archiver, Dumper, ObjectStore, SyncMode, Tools};
use crate::utils::errors::{BackupError, Result};
use artifact::{ArtifactStage, BackupArtifact};
use chrono::{DateTime, Local, Utc};
use expiry::{expire_local, expire_remote, purge_local, sweep_work_dir, ExpirySummary};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

/// Outcome of the project-level cloud step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    /// Storage mode is local only
    NotRequested,
    /// Nothing was stored locally, so nothing was pushed
    Skipped,
    Replicated,
    Failed(String),
}

impl fmt::Display for Replication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replication::NotRequested => f.write_str("-"),
            Replication::Skipped => f.write_str("skipped"),
            Replication::Replicated => f.write_str("ok"),
            Replication::Failed(_) => f.write_str("FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    pub project: String,
    pub storage: StorageMode,
    pub artifacts: Vec<BackupArtifact>,
    pub replication: Replication,
    pub local_expiry: ExpirySummary,
    pub cloud_expiry: ExpirySummary,
    pub sweep: ExpirySummary,
}

impl ProjectOutcome {
    pub fn successes(&self) -> usize {
        self.artifacts.iter().filter(|a| a.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.artifacts.iter().filter(|a| a.is_failed()).count()
    }

    /// Every database stored and, when requested, replicated.
    pub fn succeeded(&self) -> bool {
        self.failures() == 0 && !matches!(self.replication, Replication::Failed(_))
    }
}

/// Runs one cadence's cycle for a project at a time.
pub struct BackupCycle<'a, D, A, S> {
    tools: &'a Tools<D, A, S>,
    cadence: Cadence,
    temp_retention_minutes: u64,
}

impl<'a, D: Dumper, A: Archiver, S: ObjectStore> BackupCycle<'a, D, A, S> {
    pub fn new(tools: &'a Tools<D, A, S>, cadence: Cadence, temp_retention_minutes: u64) -> Self {
        Self {
            tools,
            cadence,
            temp_retention_minutes,
        }
    }

    pub async fn run(&self, project: &ProjectContext, now: DateTime<Local>) -> ProjectOutcome {
        let label = self.cadence.previous_period_label(now.naive_local());
        let now_utc = now.with_timezone(&Utc);
        let cadence_dir = project.cadence_dir(self.cadence);
        let ttl = project.retention.ttl(self.cadence);

        info!(
            project = %project.name,
            cadence = %self.cadence,
            period = %label,
            databases = project.databases.len(),
            "Starting backup cycle"
        );

        let mut outcome = ProjectOutcome {
            project: project.name.clone(),
            storage: project.storage,
            artifacts: Vec::with_capacity(project.databases.len()),
            replication: Replication::NotRequested,
            local_expiry: ExpirySummary::default(),
            cloud_expiry: ExpirySummary::default(),
            sweep: ExpirySummary::default(),
        };

        for database in &project.databases {
            let artifact = self.backup_database(project, database, &label, &cadence_dir).await;
            // A failed database keeps its older artifacts.
            if artifact.stage >= ArtifactStage::LocallyStored {
                outcome
                    .local_expiry
                    .merge(expire_local(&cadence_dir, database, ttl, now_utc));
            }
            outcome.artifacts.push(artifact);
        }

        if project.storage.includes_cloud() {
            self.replicate(project, &cadence_dir, now_utc, &mut outcome).await;
        }

        for artifact in &mut outcome.artifacts {
            if artifact.stage >= ArtifactStage::LocallyStored {
                artifact.advance(ArtifactStage::Expired);
            }
            artifact.succeed();
        }

        outcome.sweep = sweep_work_dir(&project.work_dir, self.temp_retention_minutes, now_utc);

        info!(
            project = %project.name,
            succeeded = outcome.successes(),
            failed = outcome.failures(),
            replication = %outcome.replication,
            "Backup cycle finished"
        );
        outcome
    }

    async fn backup_database(
        &self,
        project: &ProjectContext,
        database: &str,
        label: &str,
        cadence_dir: &Path,
    ) -> BackupArtifact {
        let mut artifact = BackupArtifact::new(&project.name, database);
        artifact.base_name = artifact_base_name(database, label);
        artifact.dump_path = if project.engine.dumps_directory() {
            project.work_dir.join(&artifact.base_name)
        } else {
            project.work_dir.join(format!("{}.sql", artifact.base_name))
        };
        artifact.compressed_path = project.work_dir.join(format!(
            "{}.{}",
            artifact.base_name,
            self.tools.archiver.extension()
        ));
        artifact.advance(ArtifactStage::FilenameGenerated);

        if let Err(e) = self.store(project, &mut artifact, cadence_dir).await {
            error!(
                project = %project.name,
                database,
                stage = %artifact.stage,
                "Database backup failed: {}", e
            );
            artifact.fail(e.to_string());
        }
        artifact
    }

    async fn store(
        &self,
        project: &ProjectContext,
        artifact: &mut BackupArtifact,
        cadence_dir: &Path,
    ) -> Result<()> {
        remove_path(&artifact.dump_path);

        if let Err(e) = self
            .tools
            .dumper
            .dump(project, &artifact.database, &artifact.dump_path)
            .await
        {
            remove_path(&artifact.dump_path);
            return Err(e);
        }
        artifact.advance(ArtifactStage::Dumped);

        let compressed = self
            .tools
            .archiver
            .compress(&artifact.dump_path, &artifact.compressed_path)
            .await;
        remove_path(&artifact.dump_path);
        if let Err(e) = compressed {
            remove_path(&artifact.compressed_path);
            return Err(e);
        }
        artifact.advance(ArtifactStage::Compressed);

        let file_name = artifact.compressed_path.file_name().ok_or_else(|| {
            BackupError::Execution(format!(
                "archive path {} has no file name",
                artifact.compressed_path.display()
            ))
        })?;
        let destination = cadence_dir.join(file_name);
        std::fs::create_dir_all(cadence_dir).map_err(|e| {
            BackupError::Execution(format!("cannot create {}: {e}", cadence_dir.display()))
        })?;
        move_file(&artifact.compressed_path, &destination).map_err(|e| {
            remove_path(&artifact.compressed_path);
            BackupError::Execution(format!(
                "cannot move archive to {}: {e}",
                destination.display()
            ))
        })?;

        info!(project = %project.name, database = %artifact.database, path = %destination.display(), "Artifact stored");
        artifact.local_path = Some(destination);
        artifact.advance(ArtifactStage::LocallyStored);
        Ok(())
    }

    async fn replicate(
        &self,
        project: &ProjectContext,
        cadence_dir: &Path,
        now: DateTime<Utc>,
        outcome: &mut ProjectOutcome,
    ) {
        let Some(target) = &project.cloud else {
            outcome.replication = Replication::Failed("no cloud target resolved".into());
            return;
        };

        // Mirroring an empty directory would wipe the remote cadence prefix.
        if !outcome.artifacts.iter().any(|a| a.local_path.is_some()) {
            warn!(project = %project.name, "No artifacts stored, skipping cloud replication");
            outcome.replication = Replication::Skipped;
            return;
        }

        let prefix = target.cadence_prefix(self.cadence);
        let mode = match project.storage {
            StorageMode::Both => SyncMode::Mirror,
            _ => SyncMode::UploadOnly,
        };

        if let Err(e) = self.tools.store.sync(target, cadence_dir, &prefix, mode).await {
            error!(project = %project.name, remote = %target.url(&prefix), "Cloud replication failed: {}", e);
            outcome.replication = Replication::Failed(e.to_string());
            return;
        }
        outcome.replication = Replication::Replicated;

        for artifact in outcome.artifacts.iter_mut() {
            let Some(name) = artifact.local_path.as_ref().and_then(|p| p.file_name()) else {
                continue;
            };
            artifact.cloud_key = Some(format!("{prefix}{}", name.to_string_lossy()));
            artifact.advance(ArtifactStage::CloudReplicated);
        }

        let ttl = project.retention.ttl(self.cadence);
        outcome.cloud_expiry = expire_remote(&self.tools.store, target, &prefix, ttl, now).await;

        if project.storage == StorageMode::Cloud {
            let purged = purge_local(cadence_dir);
            if purged.failed == 0 {
                for artifact in outcome.artifacts.iter_mut() {
                    artifact.local_path = None;
                }
            }
            info!(project = %project.name, removed = purged.removed, "Purged local copies after upload");
            outcome.local_expiry.merge(purged);
        }
    }
}

/// Best-effort removal of a file or directory. Missing is fine.
fn remove_path(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!(path = %path.display(), "Failed to remove partial output: {}", e);
    }
}

/// Rename, falling back to copy + delete across filesystems. A failed move
/// leaves nothing at `to`.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if let Err(e) = std::fs::copy(from, to) {
        if to.is_file() {
            remove_path(to);
        }
        return Err(e);
    }
    std::fs::remove_file(from)
}
