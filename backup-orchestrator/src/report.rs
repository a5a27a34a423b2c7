//! Run reporter: stage tables, the final verdict and the exit status.

use crate::cadence::Cadence;
use crate::executor::{ProjectOutcome, Replication};
use crate::manifest::{DedupReport, Resolution, Uniqueness};
use crate::project::filter::FrequencyReport;
use crate::project::preflight::PreflightFailure;
use std::path::{Path, PathBuf};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// What happened to one enabled project.
#[derive(Debug)]
pub enum ProjectResult {
    Rejected {
        path: PathBuf,
        failure: PreflightFailure,
    },
    Completed {
        path: PathBuf,
        outcome: ProjectOutcome,
    },
}

impl ProjectResult {
    pub fn path(&self) -> &Path {
        match self {
            ProjectResult::Rejected { path, .. } | ProjectResult::Completed { path, .. } => path,
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            ProjectResult::Rejected { .. } => false,
            ProjectResult::Completed { outcome, .. } => outcome.succeeded(),
        }
    }
}

/// Everything one invocation did, in stage order.
#[derive(Debug)]
pub struct RunReport {
    pub cadence: Cadence,
    pub considered: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub skipped: usize,
    pub audit_file: Option<PathBuf>,
    pub projects: Vec<ProjectResult>,
}

impl RunReport {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            considered: 0,
            enabled: 0,
            disabled: 0,
            skipped: 0,
            audit_file: None,
            projects: Vec::new(),
        }
    }

    pub fn record_frequency(&mut self, report: &FrequencyReport) {
        self.considered = report.entries.len();
        self.enabled = report.enabled_count();
        self.disabled = report.disabled_count();
        self.skipped = report.skipped_count();
    }

    pub fn passed_projects(&self) -> usize {
        self.projects.iter().filter(|p| p.passed()).count()
    }

    pub fn failed_projects(&self) -> usize {
        self.projects.len() - self.passed_projects()
    }

    /// Passing means every enabled project ran cleanly. Nothing enabled
    /// passes too.
    pub fn passed(&self) -> bool {
        self.projects.iter().all(ProjectResult::passed)
    }

    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn verdict(&self) -> String {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        format!(
            "{verdict}: {} backup, {} considered, {} enabled, {} disabled, {} skipped, {} project(s) ok, {} failed",
            self.cadence,
            self.considered,
            self.enabled,
            self.disabled,
            self.skipped,
            self.passed_projects(),
            self.failed_projects()
        )
    }
}

fn render<T: Tabled>(rows: Vec<T>, empty: &str) -> String {
    if rows.is_empty() {
        return format!("({empty})");
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

#[derive(Tabled)]
struct IncludeRow {
    #[tabled(rename = "Manifest")]
    manifest: String,
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Include")]
    directive: String,
    #[tabled(rename = "Resolved")]
    resolved: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn includes_table(resolution: &Resolution) -> String {
    let rows = resolution
        .records
        .iter()
        .map(|r| IncludeRow {
            manifest: r.manifest.display().to_string(),
            line: r.line,
            directive: r.directive.clone(),
            resolved: r
                .resolved
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into()),
            status: r.status.to_string(),
        })
        .collect();
    render(rows, "no include directives")
}

#[derive(Tabled)]
struct DedupRow {
    #[tabled(rename = "Project")]
    name: String,
    #[tabled(rename = "Config")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn dedupe_table(report: &DedupReport) -> String {
    let rows = report
        .entries
        .iter()
        .map(|e| DedupRow {
            name: e.name.clone(),
            path: e.path.display().to_string(),
            status: match &e.status {
                Uniqueness::Unique => "Unique".to_string(),
                Uniqueness::Duplicate { kept } => format!("Duplicate of {}", kept.display()),
            },
        })
        .collect();
    render(rows, "no projects")
}

#[derive(Tabled)]
struct FrequencyRow {
    #[tabled(rename = "Config")]
    path: String,
    #[tabled(rename = "Flag")]
    raw: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn frequency_table(report: &FrequencyReport) -> String {
    let rows = report
        .entries
        .iter()
        .map(|e| FrequencyRow {
            path: e.path.display().to_string(),
            raw: e.raw.clone().unwrap_or_else(|| "(unset)".into()),
            status: e.status.to_string(),
        })
        .collect();
    render(rows, "no projects")
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "Project")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Databases")]
    databases: String,
    #[tabled(rename = "Cloud")]
    replication: String,
    #[tabled(rename = "Expired")]
    expired: String,
    #[tabled(rename = "Result")]
    result: String,
}

pub fn projects_table(report: &RunReport) -> String {
    let rows = report
        .projects
        .iter()
        .map(|p| match p {
            ProjectResult::Rejected { path, failure } => ProjectRow {
                name: path.display().to_string(),
                mode: "-".into(),
                databases: "-".into(),
                replication: "-".into(),
                expired: "-".into(),
                result: format!("FAIL preflight {failure}"),
            },
            ProjectResult::Completed { outcome, .. } => ProjectRow {
                name: outcome.project.clone(),
                mode: outcome.storage.to_string(),
                databases: format!("{}/{} ok", outcome.successes(), outcome.artifacts.len()),
                replication: match &outcome.replication {
                    Replication::Failed(reason) => format!("FAILED: {reason}"),
                    other => other.to_string(),
                },
                expired: format!(
                    "local {}, cloud {}",
                    outcome.local_expiry.removed, outcome.cloud_expiry.removed
                ),
                result: if outcome.succeeded() { "PASS" } else { "FAIL" }.to_string(),
            },
        })
        .collect();
    render(rows, "no enabled projects")
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Database")]
    database: String,
    #[tabled(rename = "Artifact")]
    base_name: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Location / Reason")]
    detail: String,
}

pub fn artifacts_table(report: &RunReport) -> String {
    let rows = report
        .projects
        .iter()
        .filter_map(|p| match p {
            ProjectResult::Completed { outcome, .. } => Some(&outcome.artifacts),
            ProjectResult::Rejected { .. } => None,
        })
        .flatten()
        .map(|a| ArtifactRow {
            project: a.project.clone(),
            database: a.database.clone(),
            base_name: a.base_name.clone(),
            stage: a.stage.to_string(),
            status: a.status.to_string(),
            detail: a
                .failure_reason()
                .map(str::to_string)
                .unwrap_or_else(|| a.location()),
        })
        .collect();
    render(rows, "no artifacts")
}
