//! Directory listing with modification times, used by expiry and the
//! working-directory sweep.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum depth below the root (None = unlimited)
    pub max_depth: Option<usize>,

    /// Report directories as entries too
    pub include_dirs: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: Some(1),
            include_dirs: false,
        }
    }
}

impl WalkOptions {
    /// Immediate children, files and directories alike.
    pub fn children() -> Self {
        Self {
            include_dirs: true,
            ..Self::default()
        }
    }
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,

    /// Final path component, lossily decoded
    pub name: String,

    pub is_dir: bool,

    pub modified: DateTime<Utc>,
}

impl FileInfo {
    /// Symlinks are reported as themselves and never followed.
    fn from_entry(entry: &DirEntry) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        Ok(Self {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Modified strictly before `cutoff`.
    pub fn older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.modified < cutoff
    }
}

/// Walk `root` and collect matching entries. A missing root yields nothing.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut entries = Vec::new();
    for entry in walker.sort_by_file_name() {
        let entry = entry?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        entries.push(FileInfo::from_entry(&entry)?);
    }

    Ok(entries)
}

/// Delete a file, or a directory with its contents.
pub fn remove_entry(entry: &FileInfo) -> std::io::Result<()> {
    if entry.is_dir {
        std::fs::remove_dir_all(&entry.path)
    } else {
        std::fs::remove_file(&entry.path)
    }
}
