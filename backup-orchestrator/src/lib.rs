//! Backup Orchestrator Library
//!
//! Periodic database backups driven by a scheduler: resolve the project
//! manifest, pick the projects enabled for a cadence, validate each one and
//! run its dump → compress → store → replicate → expire cycle.

pub mod cadence;
pub mod config;
pub mod executor;
pub mod fs;
pub mod lock;
pub mod manifest;
pub mod naming;
pub mod orchestrator;
pub mod project;
pub mod report;
pub mod retention;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use cadence::Cadence;
pub use config::Config;
pub use orchestrator::Orchestrator;
pub use utils::errors::{BackupError, Result};
