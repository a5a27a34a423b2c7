//! Custom error types for the backup orchestrator.
//!
//! Each variant maps to the narrowest scope a failure is allowed to abort:
//! an include line, a project, a database, or the whole run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Manifest or project file missing, unreadable or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A preflight step rejected the project.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required external tool is absent. Fatal for the run.
    #[error("Missing dependency: {0}")]
    Dependency(String),

    /// Bucket unreachable, prefix not writable or credentials rejected.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Dump, compress or move failed for one database.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Another invocation for the same cadence holds the lock.
    #[error("Run locked: {0}")]
    Locked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackupError {
    /// Errors that stop the whole run instead of a single project.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackupError::Dependency(_) | BackupError::Locked(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BackupError::Dependency("tar".into()).is_fatal());
        assert!(BackupError::Locked("daily".into()).is_fatal());
        assert!(!BackupError::Validation("bad".into()).is_fatal());
        assert!(!BackupError::Execution("dump".into()).is_fatal());
    }

    #[test]
    fn test_display_prefix() {
        let err = BackupError::Storage("bucket missing".into());
        assert_eq!(err.to_string(), "Storage error: bucket missing");
    }
}
