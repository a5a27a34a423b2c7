//! Duplicate project detection and the unique-project audit file.
//!
//! Two files claiming the same project identity are operator error. Merging
//! them could mix credentials or retention, so the first one seen is kept and
//! every other one is excluded from the run.

use crate::naming::sanitize;
use crate::utils::errors::Result;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const AUDIT_PREFIX: &str = "unique_projects_";
const AUDIT_SUFFIX: &str = ".list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uniqueness {
    Unique,
    /// Excluded; `kept` is the path that owns the name
    Duplicate { kept: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ProjectEntry {
    pub path: PathBuf,
    /// Sanitized file stem
    pub name: String,
    pub status: Uniqueness,
}

#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub entries: Vec<ProjectEntry>,
}

impl DedupReport {
    pub fn unique_paths(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|e| e.status == Uniqueness::Unique)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn unique_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == Uniqueness::Unique)
            .count()
    }

    pub fn duplicate_count(&self) -> usize {
        self.entries.len() - self.unique_count()
    }
}

/// Name a project file is known by before its contents are read.
pub fn project_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize(&stem)
}

/// Group paths by sanitized name and keep the first of each group.
pub fn detect_duplicates(paths: &[PathBuf]) -> DedupReport {
    let mut owners: HashMap<String, PathBuf> = HashMap::new();
    let mut entries = Vec::with_capacity(paths.len());

    for path in paths {
        let name = project_name_from_path(path);
        let status = match owners.get(&name) {
            Some(kept) => {
                warn!(
                    project = %name,
                    duplicate = %path.display(),
                    kept = %kept.display(),
                    "Duplicate project name, excluding"
                );
                Uniqueness::Duplicate { kept: kept.clone() }
            }
            None => {
                owners.insert(name.clone(), path.clone());
                Uniqueness::Unique
            }
        };
        entries.push(ProjectEntry {
            path: path.clone(),
            name,
            status,
        });
    }

    DedupReport { entries }
}

/// Write the unique list to a fresh, owner-only audit file and drop older ones.
pub fn write_audit_file(dir: &Path, unique: &[PathBuf], now: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    if !nix::unistd::Uid::effective().is_root() {
        warn!("Not running as root; audit file will be owned by the current user");
    }

    let file_name = format!("{AUDIT_PREFIX}{}{AUDIT_SUFFIX}", now.format("%Y%m%d_%H%M%S"));
    let path = dir.join(file_name);

    // Remove first so the 0600 mode applies even when the name is reused.
    if path.exists() {
        fs::remove_file(&path)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&path)?;

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    writeln!(file, "# unique projects resolved on {host} at {}", now.to_rfc3339())?;
    writeln!(file, "# count: {}", unique.len())?;
    for p in unique {
        writeln!(file, "{}", p.display())?;
    }
    file.sync_all()?;

    remove_stale_audit_files(dir, &path);

    info!(path = %path.display(), count = unique.len(), "Wrote unique project list");
    Ok(path)
}

fn remove_stale_audit_files(dir: &Path, current: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path == current || !name.starts_with(AUDIT_PREFIX) || !name.ends_with(AUDIT_SUFFIX) {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), "Failed to remove stale audit file: {}", e);
        }
    }
}

/// Paths listed in an audit file, comments skipped.
#[cfg(test)]
pub(crate) fn read_audit_file(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_same_stem_in_two_directories() {
        let paths = vec![
            PathBuf::from("/etc/projects/acme.conf"),
            PathBuf::from("/srv/other/acme.conf"),
            PathBuf::from("/etc/projects/globex.conf"),
        ];
        let report = detect_duplicates(&paths);

        assert_eq!(report.unique_count(), 2);
        assert_eq!(report.duplicate_count(), 1);
        assert_eq!(report.unique_count() + report.duplicate_count(), paths.len());
        assert_eq!(
            report.entries[1].status,
            Uniqueness::Duplicate {
                kept: PathBuf::from("/etc/projects/acme.conf")
            }
        );
        assert_eq!(
            report.unique_paths(),
            vec![
                PathBuf::from("/etc/projects/acme.conf"),
                PathBuf::from("/etc/projects/globex.conf")
            ]
        );
    }

    #[test]
    fn test_names_collide_after_sanitizing() {
        let paths = vec![
            PathBuf::from("/a/my project.conf"),
            PathBuf::from("/b/my_project.conf"),
        ];
        let report = detect_duplicates(&paths);
        assert_eq!(report.entries[0].name, "my_project");
        assert_eq!(report.unique_count(), 1);
    }

    #[test]
    fn test_case_differences_are_distinct() {
        let paths = vec![PathBuf::from("/a/Acme.conf"), PathBuf::from("/b/acme.conf")];
        assert_eq!(detect_duplicates(&paths).unique_count(), 2);
    }

    #[test]
    fn test_audit_file_is_restricted_and_rotated() {
        let tmp = TempDir::new().unwrap();
        let stale = tmp.path().join("unique_projects_20000101_000000.list");
        fs::write(&stale, "old").unwrap();
        let unrelated = tmp.path().join("keep.txt");
        fs::write(&unrelated, "x").unwrap();

        let unique = vec![PathBuf::from("/etc/projects/acme.conf")];
        let path = write_audit_file(tmp.path(), &unique, Local::now()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert_eq!(read_audit_file(&path).unwrap(), unique);
    }

    #[test]
    fn test_audit_file_contains_one_acme() {
        let tmp = TempDir::new().unwrap();
        let report = detect_duplicates(&[
            PathBuf::from("/x/acme.conf"),
            PathBuf::from("/y/acme.conf"),
        ]);
        let path = write_audit_file(tmp.path(), &report.unique_paths(), Local::now()).unwrap();
        let listed = read_audit_file(&path).unwrap();
        assert_eq!(listed, vec![PathBuf::from("/x/acme.conf")]);
    }
}
