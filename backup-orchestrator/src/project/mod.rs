//! Per-project configuration: parsing, cadence filtering and preflight.

pub mod file;
pub mod filter;
pub mod model;
pub mod preflight;

pub use file::ProjectFile;
pub use filter::{filter_by_frequency, FrequencyReport, FrequencyStatus};
pub use model::{CloudTarget, Credentials, DbEngine, ProjectContext, StorageMode};
pub use preflight::{Preflight, PreflightFailure, PreflightStep};
