//! One invocation, start to finish.
//!
//! resolve manifest → drop duplicates → filter by cadence → preflight every
//! enabled project → backup cycle per project that passed → report.
//!
//! Only fatal problems (missing manifest, missing tool, lock held) return an
//! error. Everything else ends up in the [`RunReport`].

use crate::cadence::Cadence;
use crate::config::Config;
use crate::executor::BackupCycle;
use crate::lock::RunLock;
use crate::manifest::{detect_duplicates, resolve_manifest, write_audit_file};
use crate::project::filter::filter_by_frequency;
use crate::project::model::ProjectContext;
use crate::project::preflight::{Preflight, PreflightFailure, PreflightStep};
use crate::report::{self, ProjectResult, RunReport};
use crate::tools::{Archiver, Dumper, ObjectStore, Tools};
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

pub struct Orchestrator<'a, D, A, S> {
    config: &'a Config,
    tools: &'a Tools<D, A, S>,
}

impl<'a, D: Dumper, A: Archiver, S: ObjectStore> Orchestrator<'a, D, A, S> {
    pub fn new(config: &'a Config, tools: &'a Tools<D, A, S>) -> Self {
        Self { config, tools }
    }

    pub async fn run(&self, cadence: Cadence) -> Result<RunReport> {
        self.run_at(cadence, Local::now()).await
    }

    /// Run with a fixed start time. Every project of the invocation shares
    /// the period label and expiry clock derived from `now`.
    pub async fn run_at(&self, cadence: Cadence, now: DateTime<Local>) -> Result<RunReport> {
        let paths = &self.config.paths;
        info!(cadence = %cadence, manifest = %paths.manifest.display(), "Starting backup run");

        self.tools.archiver.check()?;
        let _lock = RunLock::acquire(&paths.lock_dir, cadence)?;

        let resolution = resolve_manifest(&paths.manifest)?;
        println!("{}", report::includes_table(&resolution));
        if resolution.invalid_count() > 0 {
            warn!(invalid = resolution.invalid_count(), "Some include directives were rejected");
        }

        let dedup = detect_duplicates(&resolution.projects);
        println!("{}", report::dedupe_table(&dedup));
        let unique = dedup.unique_paths();
        info!(
            unique = dedup.unique_count(),
            duplicates = dedup.duplicate_count(),
            "Duplicate detection finished"
        );

        let mut run_report = RunReport::new(cadence);
        match write_audit_file(&paths.audit_dir, &unique, now) {
            Ok(path) => run_report.audit_file = Some(path),
            Err(e) => warn!(dir = %paths.audit_dir.display(), "Could not write audit file: {}", e),
        }

        let frequency = filter_by_frequency(&unique, cadence);
        println!("{}", report::frequency_table(&frequency));
        run_report.record_frequency(&frequency);

        let enabled = frequency.enabled();
        if enabled.is_empty() {
            info!(cadence = %cadence, "No projects enabled for this cadence");
            println!("{}", run_report.verdict());
            return Ok(run_report);
        }

        // Every project is checked before the first backup starts, so a
        // missing tool stops the run with nothing half done.
        let planned = self.preflight_all(enabled).await?;

        let cycle = BackupCycle::new(self.tools, cadence, self.config.cleanup.temp_retention_minutes);
        for plan in planned {
            let result = match plan {
                Planned::Rejected(result) => result,
                Planned::Ready { path, project } => ProjectResult::Completed {
                    path,
                    outcome: cycle.run(&project, now).await,
                },
            };
            run_report.projects.push(result);
        }

        println!("{}", report::projects_table(&run_report));
        println!("{}", report::artifacts_table(&run_report));
        println!("{}", run_report.verdict());
        info!(
            cadence = %cadence,
            passed = run_report.passed_projects(),
            failed = run_report.failed_projects(),
            "Backup run finished"
        );
        Ok(run_report)
    }

    /// Preflight every enabled project in manifest order. Only a fatal
    /// failure returns an error.
    async fn preflight_all(&self, enabled: Vec<PathBuf>) -> Result<Vec<Planned>> {
        let preflight = Preflight::new(&self.config.paths, &self.tools.dumper, &self.tools.store);
        let mut owners: HashMap<String, PathBuf> = HashMap::new();
        let mut planned = Vec::with_capacity(enabled.len());

        for path in enabled {
            let project = match preflight.run(&path).await {
                Ok(project) => project,
                Err(failure) if failure.error.is_fatal() => {
                    error!(project = %path.display(), "Fatal preflight failure: {}", failure);
                    return Err(failure.error);
                }
                Err(failure) => {
                    error!(project = %path.display(), "Preflight failed: {}", failure);
                    planned.push(Planned::Rejected(ProjectResult::Rejected { path, failure }));
                    continue;
                }
            };

            // Same identity means same working directory and backup root.
            if let Some(owner) = owners.get(&project.name) {
                let failure = PreflightFailure {
                    step: PreflightStep::Identity,
                    error: BackupError::Validation(format!(
                        "PROJECT_NAME '{}' is already used by {}",
                        project.name,
                        owner.display()
                    )),
                };
                error!(project = %path.display(), "Preflight failed: {}", failure);
                planned.push(Planned::Rejected(ProjectResult::Rejected { path, failure }));
                continue;
            }
            owners.insert(project.name.clone(), path.clone());
            planned.push(Planned::Ready { path, project });
        }
        Ok(planned)
    }
}

enum Planned {
    Rejected(ProjectResult),
    Ready { path: PathBuf, project: ProjectContext },
}
