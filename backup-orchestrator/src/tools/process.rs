//! Subprocess plumbing shared by the dump, archive and cloud tools.
//!
//! Exit status is the only success signal. Commands run one at a time and
//! are killed if they outlive the configured timeout.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    Spawn(String),
    TimedOut(Duration),
    Exit { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandFailure::Spawn(e) => write!(f, "failed to start: {e}"),
            CommandFailure::TimedOut(d) => write!(f, "timed out after {}s", d.as_secs()),
            CommandFailure::Exit { code, stderr } => {
                match code {
                    Some(c) => write!(f, "exited with status {c}")?,
                    None => write!(f, "terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

/// Run `cmd` to completion and return its output when it exits 0.
pub async fn run(mut cmd: Command, timeout: Option<Duration>) -> Result<Output, CommandFailure> {
    cmd.kill_on_drop(true).stdin(std::process::Stdio::null());
    // Arguments may carry credentials; log the program only.
    debug!(program = ?cmd.as_std().get_program(), "Running external command");

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
            Ok(result) => result,
            Err(_) => return Err(CommandFailure::TimedOut(limit)),
        },
        None => cmd.output().await,
    }
    .map_err(|e| CommandFailure::Spawn(e.to_string()))?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(CommandFailure::Exit {
            code: output.status.code(),
            stderr: summarize(&output.stderr),
        })
    }
}

/// Last non-empty stderr line, trimmed, for log and report messages.
pub fn summarize(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    const MAX: usize = 300;
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// Locate an executable by absolute path or on `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_takes_last_line() {
        assert_eq!(summarize(b"warning: x\nerror: access denied\n\n"), "error: access denied");
        assert_eq!(summarize(b""), "");
    }

    #[test]
    fn test_find_executable() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("/bin/sh").is_some());
        assert!(find_executable("definitely-not-a-real-binary-xyz").is_none());
    }

    #[tokio::test]
    async fn test_run_success_and_failure() {
        let mut ok = Command::new("sh");
        ok.arg("-c").arg("echo hello");
        let out = run(ok, None).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");

        let mut bad = Command::new("sh");
        bad.arg("-c").arg("echo boom >&2; exit 3");
        let err = run(bad, None).await.unwrap_err();
        assert_eq!(
            err,
            CommandFailure::Exit {
                code: Some(3),
                stderr: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let mut slow = Command::new("sh");
        slow.arg("-c").arg("sleep 5");
        let err = run(slow, Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(matches!(err, CommandFailure::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let cmd = Command::new("definitely-not-a-real-binary-xyz");
        assert!(matches!(run(cmd, None).await, Err(CommandFailure::Spawn(_))));
    }
}
