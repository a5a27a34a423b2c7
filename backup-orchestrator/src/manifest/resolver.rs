//! Expands `include` directives into a flat list of project files.
//!
//! Manifest syntax, one directive per line:
//!
//! ```text
//! # comment
//! include /etc/backup-orchestrator/projects.d/*.conf;
//! include /srv/acme/backup.conf
//! ```
//!
//! Only absolute paths are accepted. An included file whose every meaningful
//! line is itself an `include` directive is treated as a nested manifest.
//! Bad lines are reported and skipped; only a missing top-level manifest is
//! an error.

use crate::utils::errors::{BackupError, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one include directive (or one glob match).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeStatus {
    Valid,
    ViaGlob,
    Invalid(String),
    AlreadyVisited,
}

impl fmt::Display for IncludeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludeStatus::Valid => f.write_str("valid"),
            IncludeStatus::ViaGlob => f.write_str("processed via glob"),
            IncludeStatus::Invalid(reason) => write!(f, "invalid: {reason}"),
            IncludeStatus::AlreadyVisited => f.write_str("already visited"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncludeRecord {
    /// Manifest the directive was read from
    pub manifest: PathBuf,
    pub line: usize,
    /// Directive argument exactly as written
    pub directive: String,
    /// Canonical path, when one could be resolved
    pub resolved: Option<PathBuf>,
    pub status: IncludeStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved project files, first-seen order, no repeats
    pub projects: Vec<PathBuf>,
    pub records: Vec<IncludeRecord>,
}

impl Resolution {
    pub fn invalid_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, IncludeStatus::Invalid(_)))
            .count()
    }

    fn push_project(&mut self, path: PathBuf) {
        if !self.projects.contains(&path) {
            self.projects.push(path);
        }
    }
}

/// Resolve a top-level manifest.
pub fn resolve_manifest(path: &Path) -> Result<Resolution> {
    let canonical = std::fs::canonicalize(path).map_err(|e| {
        BackupError::Config(format!("manifest {} is not accessible: {e}", path.display()))
    })?;
    let content = std::fs::read_to_string(&canonical).map_err(|e| {
        BackupError::Config(format!("manifest {} is not readable: {e}", path.display()))
    })?;

    let mut visited = HashSet::new();
    let mut resolution = Resolution::default();
    visited.insert(canonical.clone());
    resolve_content(&canonical, &content, &mut visited, &mut resolution);
    Ok(resolution)
}

fn resolve_content(
    manifest: &Path,
    content: &str,
    visited: &mut HashSet<PathBuf>,
    out: &mut Resolution,
) {
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let Some(directive) = meaningful(raw) else {
            continue;
        };

        let record = |directive: &str, resolved: Option<PathBuf>, status: IncludeStatus| {
            IncludeRecord {
                manifest: manifest.to_path_buf(),
                line,
                directive: directive.to_string(),
                resolved,
                status,
            }
        };

        let Some(target) = parse_include(directive) else {
            warn!(manifest = %manifest.display(), line, "Unrecognised manifest directive: {}", directive);
            out.records.push(record(
                directive,
                None,
                IncludeStatus::Invalid("unrecognised directive".into()),
            ));
            continue;
        };

        if !Path::new(target).is_absolute() {
            warn!(manifest = %manifest.display(), line, "Relative include rejected: {}", target);
            out.records.push(record(
                target,
                None,
                IncludeStatus::Invalid("relative path not allowed".into()),
            ));
            continue;
        }

        if is_glob(target) {
            expand_glob(manifest, line, target, visited, out);
        } else {
            include_path(manifest, line, target, Path::new(target), IncludeStatus::Valid, visited, out);
        }
    }
}

fn expand_glob(
    manifest: &Path,
    line: usize,
    pattern: &str,
    visited: &mut HashSet<PathBuf>,
    out: &mut Resolution,
) {
    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(e) => {
            out.records.push(IncludeRecord {
                manifest: manifest.to_path_buf(),
                line,
                directive: pattern.to_string(),
                resolved: None,
                status: IncludeStatus::Invalid(format!("bad glob pattern: {}", e.msg)),
            });
            return;
        }
    };

    let mut matched = 0usize;
    for entry in entries {
        matched += 1;
        match entry {
            Ok(path) => {
                include_path(manifest, line, pattern, &path, IncludeStatus::ViaGlob, visited, out)
            }
            Err(e) => out.records.push(IncludeRecord {
                manifest: manifest.to_path_buf(),
                line,
                directive: pattern.to_string(),
                resolved: Some(e.path().to_path_buf()),
                status: IncludeStatus::Invalid(format!("unreadable: {}", e.error())),
            }),
        }
    }

    if matched == 0 {
        debug!(pattern, "Glob matched nothing");
        out.records.push(IncludeRecord {
            manifest: manifest.to_path_buf(),
            line,
            directive: pattern.to_string(),
            resolved: None,
            status: IncludeStatus::Invalid("glob matched nothing".into()),
        });
    }
}

fn include_path(
    manifest: &Path,
    line: usize,
    directive: &str,
    path: &Path,
    ok_status: IncludeStatus,
    visited: &mut HashSet<PathBuf>,
    out: &mut Resolution,
) {
    let mut record = IncludeRecord {
        manifest: manifest.to_path_buf(),
        line,
        directive: directive.to_string(),
        resolved: None,
        status: ok_status,
    };

    let canonical = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) => {
            record.resolved = Some(path.to_path_buf());
            record.status = IncludeStatus::Invalid("not found".into());
            out.records.push(record);
            return;
        }
    };
    record.resolved = Some(canonical.clone());

    if canonical.is_dir() {
        record.status = IncludeStatus::Invalid("is a directory".into());
        out.records.push(record);
        return;
    }

    let content = match std::fs::read_to_string(&canonical) {
        Ok(c) => c,
        Err(e) => {
            record.status = IncludeStatus::Invalid(format!("unreadable: {e}"));
            out.records.push(record);
            return;
        }
    };

    if is_manifest(&content) {
        if !visited.insert(canonical.clone()) {
            warn!(manifest = %canonical.display(), "Manifest already visited, skipping");
            record.status = IncludeStatus::AlreadyVisited;
            out.records.push(record);
            return;
        }
        out.records.push(record);
        resolve_content(&canonical, &content, visited, out);
        return;
    }

    out.push_project(canonical);
    out.records.push(record);
}

/// Strip comments and whitespace; `None` for lines with nothing left. A `#`
/// opens a comment only at the start of the line or after whitespace.
fn meaningful(raw: &str) -> Option<&str> {
    let mut prev_blank = true;
    let mut end = raw.len();
    for (i, c) in raw.char_indices() {
        if c == '#' && prev_blank {
            end = i;
            break;
        }
        prev_blank = c.is_whitespace();
    }
    let line = &raw[..end];
    let line = line.trim();
    (!line.is_empty()).then_some(line)
}

/// Argument of an `include <path>[;]` directive.
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("include")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim().trim_end_matches(';').trim();
    (!target.is_empty()).then_some(target)
}

fn is_glob(target: &str) -> bool {
    target.contains(['*', '?', '['])
}

/// A file made only of include directives is a manifest, not a project.
fn is_manifest(content: &str) -> bool {
    let mut lines = content.lines().filter_map(meaningful).peekable();
    lines.peek().is_some() && lines.all(|l| parse_include(l).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_include_forms() {
        assert_eq!(parse_include("include /a/b.conf;"), Some("/a/b.conf"));
        assert_eq!(parse_include("include   /a/b.conf"), Some("/a/b.conf"));
        assert_eq!(parse_include("include /a/*.conf ;"), Some("/a/*.conf"));
        assert_eq!(parse_include("includes /a"), None);
        assert_eq!(parse_include("include"), None);
        assert_eq!(parse_include("PROJECT_NAME=x"), None);
    }

    #[test]
    fn test_hash_inside_path_is_not_a_comment() {
        assert_eq!(meaningful("include /srv/a#1.conf; # tenant 1"), Some("include /srv/a#1.conf;"));
        assert_eq!(meaningful("  # whole line"), None);
        assert_eq!(meaningful("include /srv/a.conf\t#note"), Some("include /srv/a.conf"));

        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let hashed = write(&root, "projects/a#1.conf", "PROJECT_NAME=a1\n");
        let manifest = write(
            &root,
            "manifest.conf",
            &format!("include {}; # first tenant\n", hashed.display()),
        );
        assert_eq!(resolve_manifest(&manifest).unwrap().projects, vec![hashed]);
    }

    #[test]
    fn test_literal_and_glob_includes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let a = write(&root, "projects/a.conf", "PROJECT_NAME=a\n");
        let b = write(&root, "projects/b.conf", "PROJECT_NAME=b\n");
        let c = write(&root, "extra/c.conf", "PROJECT_NAME=c\n");
        let manifest = write(
            &root,
            "manifest.conf",
            &format!(
                "# projects\n\ninclude {}/projects/*.conf;\ninclude {}\n",
                root.display(),
                c.display()
            ),
        );

        let res = resolve_manifest(&manifest).unwrap();
        assert_eq!(res.projects, vec![a, b, c]);
        assert_eq!(res.invalid_count(), 0);
        assert_eq!(
            res.records.iter().filter(|r| r.status == IncludeStatus::ViaGlob).count(),
            2
        );
    }

    #[test]
    fn test_invalid_includes_do_not_abort() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let good = write(&root, "good.conf", "PROJECT_NAME=good\n");
        fs::create_dir_all(root.join("adir")).unwrap();
        let manifest = write(
            &root,
            "manifest.conf",
            &format!(
                "include relative/path.conf;\ninclude {root}/missing.conf;\ninclude {root}/adir;\ninclude {root}/nothing/*.conf;\nbogus line\ninclude {};\n",
                good.display(),
                root = root.display()
            ),
        );

        let res = resolve_manifest(&manifest).unwrap();
        assert_eq!(res.projects, vec![good]);
        assert_eq!(res.invalid_count(), 5);
        assert!(res.records.iter().any(|r| r.status
            == IncludeStatus::Invalid("relative path not allowed".into())));
        assert!(res
            .records
            .iter()
            .any(|r| r.status == IncludeStatus::Invalid("is a directory".into())));
    }

    #[test]
    fn test_nested_manifest_cycle_is_guarded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let project = write(&root, "p.conf", "PROJECT_NAME=p\n");
        let top = root.join("top.manifest");
        let nested = root.join("nested.manifest");
        fs::write(
            &top,
            format!("include {};\n", nested.display()),
        )
        .unwrap();
        fs::write(
            &nested,
            format!("include {};\ninclude {};\n", project.display(), top.display()),
        )
        .unwrap();

        let res = resolve_manifest(&top).unwrap();
        assert_eq!(res.projects, vec![project]);
        assert!(res
            .records
            .iter()
            .any(|r| r.status == IncludeStatus::AlreadyVisited));
    }

    #[test]
    fn test_same_file_twice_listed_once() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let p = write(&root, "p.conf", "PROJECT_NAME=p\n");
        let manifest = write(
            &root,
            "m.conf",
            &format!("include {0};\ninclude {1}/*.conf;\n", p.display(), root.display()),
        );

        let res = resolve_manifest(&manifest).unwrap();
        // m.conf matches the glob too but is recognised as a visited manifest.
        assert_eq!(res.projects, vec![p]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(&root, "d/x.conf", "PROJECT_NAME=x\n");
        write(&root, "d/y.conf", "PROJECT_NAME=y\n");
        let manifest = write(&root, "m.conf", &format!("include {}/d/*.conf\n", root.display()));

        let first = resolve_manifest(&manifest).unwrap();
        let second = resolve_manifest(&manifest).unwrap();
        assert_eq!(first.projects, second.projects);
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let err = resolve_manifest(Path::new("/definitely/not/here.conf")).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }
}
