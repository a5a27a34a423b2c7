//! Age-based cleanup: local and remote retention, the working-directory
//! sweep and the post-upload local purge.
//!
//! Nothing here fails a project. Problems are logged and counted.

use crate::fs::walker::{remove_entry, walk_directory, FileInfo, WalkOptions};
use crate::naming::is_artifact_of;
use crate::project::model::CloudTarget;
use crate::retention::Ttl;
use crate::tools::ObjectStore;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySummary {
    pub examined: usize,
    pub removed: usize,
    pub failed: usize,
}

impl ExpirySummary {
    pub fn merge(&mut self, other: ExpirySummary) {
        self.examined += other.examined;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

fn remove_all<'a>(entries: impl IntoIterator<Item = &'a FileInfo>, what: &str) -> ExpirySummary {
    let mut summary = ExpirySummary::default();
    for entry in entries {
        match remove_entry(entry) {
            Ok(()) => {
                debug!(path = %entry.path.display(), "Removed {}", what);
                summary.removed += 1;
            }
            Err(e) => {
                warn!(path = %entry.path.display(), "Failed to remove {}: {}", what, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Remove `database`'s artifacts in `dir` older than the TTL.
pub fn expire_local(dir: &Path, database: &str, ttl: Ttl, now: DateTime<Utc>) -> ExpirySummary {
    let Some(cutoff) = ttl.cutoff(now) else {
        return ExpirySummary::default();
    };

    let entries = match walk_directory(dir, &WalkOptions::default()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), database, "Local expiry could not list directory: {}", e);
            return ExpirySummary {
                failed: 1,
                ..ExpirySummary::default()
            };
        }
    };

    let owned: Vec<_> = entries
        .into_iter()
        .filter(|e| is_artifact_of(database, &e.name))
        .collect();
    let expired: Vec<_> = owned.iter().filter(|e| e.older_than(cutoff)).collect();

    let mut summary = remove_all(expired, "expired artifact");
    summary.examined = owned.len();
    if summary.removed > 0 {
        info!(database, removed = summary.removed, ttl = %ttl, "Expired local artifacts");
    }
    summary
}

/// Delete remote objects under `prefix` older than the TTL.
pub async fn expire_remote<S: ObjectStore>(
    store: &S,
    target: &CloudTarget,
    prefix: &str,
    ttl: Ttl,
    now: DateTime<Utc>,
) -> ExpirySummary {
    let mut summary = ExpirySummary::default();
    let Some(cutoff) = ttl.cutoff(now) else {
        return summary;
    };

    let objects = match store.list(target, prefix).await {
        Ok(objects) => objects,
        Err(e) => {
            warn!(remote = %target.url(prefix), "Cloud expiry could not list objects: {}", e);
            summary.failed += 1;
            return summary;
        }
    };

    summary.examined = objects.len();
    for object in objects.iter().filter(|o| o.last_modified < cutoff) {
        match store.delete(target, &object.key).await {
            Ok(()) => summary.removed += 1,
            Err(e) => {
                warn!(key = %object.key, "Failed to delete expired object: {}", e);
                summary.failed += 1;
            }
        }
    }
    if summary.removed > 0 {
        info!(remote = %target.url(prefix), removed = summary.removed, ttl = %ttl, "Expired cloud objects");
    }
    summary
}

/// Clear leftovers in a project's working directory older than
/// `retention_minutes`, whatever they are.
pub fn sweep_work_dir(dir: &Path, retention_minutes: u64, now: DateTime<Utc>) -> ExpirySummary {
    let cutoff = i64::try_from(retention_minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .and_then(|d| now.checked_sub_signed(d));
    let Some(cutoff) = cutoff else {
        return ExpirySummary::default();
    };

    let entries = match walk_directory(dir, &WalkOptions::children()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "Working directory sweep failed: {}", e);
            return ExpirySummary {
                failed: 1,
                ..ExpirySummary::default()
            };
        }
    };

    let stale: Vec<_> = entries.iter().filter(|e| e.older_than(cutoff)).collect();
    let mut summary = remove_all(stale, "stale working file");
    summary.examined = entries.len();
    summary
}

/// Remove every file in a cadence directory once it lives in the bucket.
pub fn purge_local(dir: &Path) -> ExpirySummary {
    match walk_directory(dir, &WalkOptions::default()) {
        Ok(entries) => {
            let mut summary = remove_all(&entries, "uploaded local copy");
            summary.examined = entries.len();
            summary
        }
        Err(e) => {
            warn!(dir = %dir.display(), "Local purge could not list directory: {}", e);
            ExpirySummary {
                failed: 1,
                ..ExpirySummary::default()
            }
        }
    }
}
