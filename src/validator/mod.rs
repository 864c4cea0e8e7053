//! Build validation: run the produced program and decide whether it is buggy.
//!
//! The program is started as `<runtime> <entry_point>` inside the project
//! directory, in its own process group, with stdout and stderr captured.
//! After the grace period:
//!
//! - still running: the group gets SIGTERM, then SIGKILL a second later, and
//!   the run counts as bug-free
//! - exit status 0: no bug
//! - non-zero with a traceback on stderr: bug, with the project directory
//!   prefix stripped from the message
//! - non-zero without a traceback (including empty stderr): no bug
//!
//! Failing to spawn or wait is itself reported as a bug.

mod process;
pub mod remediation;

pub use process::ProcessGroupGuard;
pub use remediation::{DependencyInstaller, PipInstaller, fix_module_not_found_error};

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::devchain_config::ValidatorSection;

/// Pause between SIGTERM and SIGKILL for a program that outlived its grace
/// period.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Upper bound on draining output and on reaping a killed leader.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugReport {
    pub has_bug: bool,
    pub message: String,
}

impl BugReport {
    pub fn clean() -> Self {
        Self {
            has_bug: false,
            message: String::new(),
        }
    }

    pub fn bug(message: impl Into<String>) -> Self {
        Self {
            has_bug: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildValidator {
    directory: PathBuf,
    runtime: String,
    entry_point: String,
    grace_period: Duration,
}

impl BuildValidator {
    pub fn new(directory: impl Into<PathBuf>, settings: &ValidatorSection) -> Self {
        Self {
            directory: directory.into(),
            runtime: settings.runtime.clone(),
            entry_point: settings.entry_point.clone(),
            grace_period: Duration::from_secs(settings.grace_period_secs),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Run the program once and classify the outcome.
    pub async fn exist_bugs(&self) -> BugReport {
        match self.run().await {
            Ok(report) => report,
            Err(e) => BugReport::bug(format!("An error occurred: {:#}", e)),
        }
    }

    async fn run(&self) -> Result<BugReport> {
        let mut cmd = Command::new(&self.runtime);
        cmd.arg(&self.entry_point)
            .current_dir(&self.directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(runtime = %self.runtime, entry = %self.entry_point, dir = %self.directory.display(), "Launching program");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {} {}", self.runtime, self.entry_point))?;
        let mut group = ProcessGroupGuard::new(child.id());
        let mut output = tokio::spawn(capture(child.stdout.take(), child.stderr.take()));

        let status = match timeout(self.grace_period, child.wait()).await {
            Ok(status) => status.context("Failed to wait for program")?,
            Err(_) => {
                info!(
                    grace_secs = self.grace_period.as_secs_f32(),
                    "Program still running after grace period; terminating"
                );
                // The leader stays unreaped until the group is killed.
                group.terminate();
                tokio::time::sleep(TERMINATE_GRACE).await;
                group.kill();
                if timeout(DRAIN_TIMEOUT, child.wait()).await.is_err() {
                    warn!("Program did not exit after SIGKILL");
                }
                output.abort();
                return Ok(BugReport::clean());
            }
        };

        let captured = match timeout(DRAIN_TIMEOUT, &mut output).await {
            Ok(joined) => {
                group.release();
                joined.unwrap_or_default()
            }
            Err(_) => {
                // Open pipes mean a group member is still alive, which keeps
                // the group id reserved.
                debug!("Output still open after exit; killing leftover group members");
                group.kill();
                let drained = timeout(DRAIN_TIMEOUT, &mut output).await;
                output.abort();
                drained.ok().and_then(|joined| joined.ok()).unwrap_or_default()
            }
        };
        if !captured.stdout.is_empty() {
            debug!(stdout = %captured.stdout.trim_end(), "Program output");
        }

        Ok(classify(status.success(), &captured.stderr, &self.directory))
    }
}

#[derive(Debug, Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

async fn capture<O, E>(stdout: Option<O>, stderr: Option<E>) -> Captured
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
    Captured { stdout, stderr }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Classify a finished run.
pub fn classify(success: bool, stderr: &str, directory: &Path) -> BugReport {
    if success {
        return BugReport::clean();
    }
    if stderr.to_lowercase().contains("traceback") {
        let prefix = format!("{}/", directory.display());
        return BugReport::bug(stderr.replace(&prefix, ""));
    }
    BugReport::clean()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(entry: &str) -> ValidatorSection {
        ValidatorSection {
            runtime: "sh".to_string(),
            entry_point: entry.to_string(),
            ..ValidatorSection::default()
        }
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(true, "Traceback", Path::new("/p")), BugReport::clean());
    }

    #[test]
    fn test_classify_traceback_strips_directory() {
        let report = classify(
            false,
            "Traceback (most recent call last):\n  File \"/work/app/main.py\", line 3\nNameError",
            Path::new("/work/app"),
        );
        assert!(report.has_bug);
        assert!(report.message.contains("File \"main.py\""));
        assert!(!report.message.contains("/work/app/"));
    }

    #[test]
    fn test_classify_nonzero_without_stderr_is_not_a_bug() {
        assert!(!classify(false, "", Path::new("/p")).has_bug);
        assert!(!classify(false, "warning: deprecated", Path::new("/p")).has_bug);
    }

    #[test]
    fn test_classify_traceback_is_case_insensitive() {
        assert!(classify(false, "TRACEBACK", Path::new("/p")).has_bug);
    }

    #[cfg(unix)]
    mod process_runs {
        use super::*;
        use tempfile::tempdir;

        #[tokio::test]
        async fn test_good_program_twice() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("main.sh"), "echo hello\nexit 0\n").unwrap();
            let validator = BuildValidator::new(dir.path(), &settings("main.sh"));
            assert!(!validator.exist_bugs().await.has_bug);
            assert!(!validator.exist_bugs().await.has_bug);
        }

        #[tokio::test]
        async fn test_traceback_program_reports_bug() {
            let dir = tempdir().unwrap();
            let script = format!(
                "echo 'Traceback (most recent call last):' >&2\necho '  File \"{}/main.sh\", line 1' >&2\nexit 1\n",
                dir.path().display()
            );
            std::fs::write(dir.path().join("main.sh"), script).unwrap();

            let report = BuildValidator::new(dir.path(), &settings("main.sh"))
                .exist_bugs()
                .await;
            assert!(report.has_bug);
            assert!(report.message.contains("File \"main.sh\""));
        }

        #[tokio::test]
        async fn test_silent_failure_is_not_a_bug() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("main.sh"), "exit 3\n").unwrap();
            let report = BuildValidator::new(dir.path(), &settings("main.sh"))
                .exist_bugs()
                .await;
            assert!(!report.has_bug);
        }

        #[tokio::test]
        async fn test_long_running_program_is_terminated() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("main.sh"), "sleep 30\n").unwrap();
            let validator = BuildValidator::new(dir.path(), &settings("main.sh"))
                .with_grace_period(Duration::from_millis(300));

            let started = std::time::Instant::now();
            let report = validator.exist_bugs().await;
            assert!(!report.has_bug);
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_program_ignoring_sigterm_is_killed() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("main.sh"), "trap '' TERM\nsleep 20\n").unwrap();
            let validator = BuildValidator::new(dir.path(), &settings("main.sh"))
                .with_grace_period(Duration::from_millis(300));

            let started = std::time::Instant::now();
            let report = validator.exist_bugs().await;
            assert!(!report.has_bug);
            assert!(started.elapsed() < Duration::from_secs(8));
        }

        #[tokio::test]
        async fn test_background_child_holding_stderr_is_killed() {
            let dir = tempdir().unwrap();
            std::fs::write(
                dir.path().join("main.sh"),
                "sleep 20 &\necho 'Traceback (most recent call last):' >&2\nexit 1\n",
            )
            .unwrap();
            let validator = BuildValidator::new(dir.path(), &settings("main.sh"));

            let started = std::time::Instant::now();
            let report = validator.exist_bugs().await;
            assert!(report.has_bug);
            assert!(report.message.contains("Traceback"));
            assert!(started.elapsed() < Duration::from_secs(8));
        }

        #[tokio::test]
        async fn test_noisy_stdout_does_not_block() {
            let dir = tempdir().unwrap();
            std::fs::write(
                dir.path().join("main.sh"),
                "i=0\nwhile [ $i -lt 20000 ]; do echo \"line $i padding padding padding\"; i=$((i+1)); done\nexit 0\n",
            )
            .unwrap();
            let report = BuildValidator::new(dir.path(), &settings("main.sh"))
                .exist_bugs()
                .await;
            assert!(!report.has_bug);
        }

        #[tokio::test]
        async fn test_spawn_failure_is_reported_as_bug() {
            let dir = tempdir().unwrap();
            let validator = BuildValidator::new(
                dir.path(),
                &ValidatorSection {
                    runtime: "devchain-no-such-runtime".to_string(),
                    ..ValidatorSection::default()
                },
            );
            let report = validator.exist_bugs().await;
            assert!(report.has_bug);
            assert!(report.message.starts_with("An error occurred:"));
        }
    }
}
