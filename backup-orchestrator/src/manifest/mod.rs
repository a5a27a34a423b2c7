//! Manifest resolution and duplicate project detection.

pub mod dedupe;
pub mod resolver;

pub use dedupe::{detect_duplicates, write_audit_file, DedupReport, ProjectEntry, Uniqueness};
pub use resolver::{resolve_manifest, IncludeRecord, IncludeStatus, Resolution};
