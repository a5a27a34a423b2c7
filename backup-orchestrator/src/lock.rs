//! Per-cadence advisory lock.
//!
//! Two invocations of the same cadence never run together; different
//! cadences may overlap. The lock lives as long as the returned guard.

use crate::cadence::Cadence;
use crate::utils::errors::{BackupError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take `<dir>/<cadence>.lock` without blocking.
    pub fn acquire(dir: &Path, cadence: Cadence) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            BackupError::Config(format!("cannot create lock directory {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!("{}.lock", cadence.as_str()));

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(BackupError::Locked(format!(
                "another {cadence} run holds {}",
                path.display()
            )));
        }

        // Holder's pid, for whoever finds the lock taken.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { file, path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), "Failed to release run lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_same_cadence_is_exclusive() {
        let tmp = TempDir::new().unwrap();
        let first = RunLock::acquire(tmp.path(), Cadence::Daily).unwrap();
        assert!(tmp.path().join("daily.lock").exists());

        let second = RunLock::acquire(tmp.path(), Cadence::Daily).unwrap_err();
        assert!(matches!(second, BackupError::Locked(_)));
        assert!(second.is_fatal());

        drop(first);
        assert!(RunLock::acquire(tmp.path(), Cadence::Daily).is_ok());
    }

    #[test]
    fn test_different_cadences_overlap() {
        let tmp = TempDir::new().unwrap();
        let _daily = RunLock::acquire(tmp.path(), Cadence::Daily).unwrap();
        let _hourly = RunLock::acquire(tmp.path(), Cadence::Hourly).unwrap();
    }
}
