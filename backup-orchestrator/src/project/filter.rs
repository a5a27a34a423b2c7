//! Per-cadence enablement filter.
//!
//! Only `BACKUP_FREQUENCY_<CADENCE>` is read from each project. An unset flag
//! means enabled.

use crate::cadence::Cadence;
use crate::project::file::ProjectFile;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrequencyStatus {
    Enabled,
    Disabled,
    Skipped(String),
}

impl fmt::Display for FrequencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyStatus::Enabled => f.write_str("enabled"),
            FrequencyStatus::Disabled => f.write_str("disabled"),
            FrequencyStatus::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrequencyEntry {
    pub path: PathBuf,
    /// Flag as written, `None` when unset
    pub raw: Option<String>,
    pub status: FrequencyStatus,
}

#[derive(Debug, Clone)]
pub struct FrequencyReport {
    pub cadence: Cadence,
    pub entries: Vec<FrequencyEntry>,
}

impl FrequencyReport {
    pub fn enabled(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|e| e.status == FrequencyStatus::Enabled)
            .map(|e| e.path.clone())
            .collect()
    }

    fn count(&self, wanted: fn(&FrequencyStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| wanted(&e.status)).count()
    }

    pub fn enabled_count(&self) -> usize {
        self.count(|s| matches!(s, FrequencyStatus::Enabled))
    }

    pub fn disabled_count(&self) -> usize {
        self.count(|s| matches!(s, FrequencyStatus::Disabled))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, FrequencyStatus::Skipped(_)))
    }
}

/// Interpret an on/off switch. `None` for anything unrecognised.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Classify one project file for `cadence`.
pub fn evaluate(path: &Path, cadence: Cadence) -> FrequencyEntry {
    let key = cadence.frequency_key();
    let file = match ProjectFile::load(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(project = %path.display(), "Skipping project, config could not be loaded: {}", e);
            return FrequencyEntry {
                path: path.to_path_buf(),
                raw: None,
                status: FrequencyStatus::Skipped(e.to_string()),
            };
        }
    };

    let raw = file.get(&key).map(str::to_string);
    let status = match raw.as_deref() {
        None => FrequencyStatus::Enabled,
        Some(value) => match parse_switch(value) {
            Some(true) => FrequencyStatus::Enabled,
            Some(false) => FrequencyStatus::Disabled,
            None => {
                warn!(project = %path.display(), key = %key, value, "Unrecognised frequency flag, skipping project");
                FrequencyStatus::Skipped(format!("{key}='{value}' is not on/off"))
            }
        },
    };
    debug!(project = %path.display(), cadence = %cadence, status = %status, "Frequency evaluated");

    FrequencyEntry {
        path: path.to_path_buf(),
        raw,
        status,
    }
}

/// Classify every project, preserving input order.
pub fn filter_by_frequency(paths: &[PathBuf], cadence: Cadence) -> FrequencyReport {
    FrequencyReport {
        cadence,
        entries: paths.iter().map(|p| evaluate(p, cadence)).collect(),
    }
}
