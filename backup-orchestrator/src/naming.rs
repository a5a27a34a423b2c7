//! Project identity sanitizing and artifact file names.

use crate::utils::errors::{BackupError, Result};

/// Characters that survive sanitizing besides ASCII alphanumerics.
const SEPARATORS: [char; 3] = ['.', '_', '-'];

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Two raw names are the same project when their sanitized forms match.
pub fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || SEPARATORS.contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize a project name, rejecting names that are empty or end up as
/// nothing but separators.
pub fn sanitize_project_name(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(BackupError::Validation("project name is empty".into()));
    }
    let name = sanitize(raw);
    if name.chars().all(|c| SEPARATORS.contains(&c)) {
        return Err(BackupError::Validation(format!(
            "project name '{raw}' sanitizes to '{name}', which has no usable characters"
        )));
    }
    Ok(name)
}

/// Prefix shared by every artifact of one database.
pub fn artifact_prefix(database: &str) -> String {
    format!("{}_", sanitize(database))
}

/// Canonical artifact base name for a database and period label.
pub fn artifact_base_name(database: &str, period_label: &str) -> String {
    format!("{}{}", artifact_prefix(database), period_label)
}

/// Whether `file_name` is an artifact of `database`: its prefix followed by
/// a period label, which always opens with a four-digit year. Keeps `orders`
/// from claiming `orders_archive_*` or `orders_2_*`.
pub fn is_artifact_of(database: &str, file_name: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(&artifact_prefix(database)) else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() > 4
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && matches!(bytes[4], b'-' | b'.')
}
