//! Automatic installation of modules a failed run reported missing.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{info, warn};

static MISSING_MODULE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '(\S+)'").unwrap());

const MODULE_NOT_FOUND: &str = "ModuleNotFoundError";

/// Installs a single dependency by name.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, module: &str) -> Result<()>;
}

/// Runs `<program> install <module>`, e.g. `pip install numpy`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    program: String,
}

impl PipInstaller {
    /// `program` may carry leading arguments, as in `python3 -m pip`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DependencyInstaller for PipInstaller {
    async fn install(&self, module: &str) -> Result<()> {
        let mut parts = self.program.split_whitespace();
        let program = parts.next().context("Installer program is empty")?;

        info!("{} install {}", self.program, module);
        let output = Command::new(program)
            .args(parts)
            .arg("install")
            .arg(module)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} install {} exited with {}: {}",
                self.program,
                module,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Distinct module names from `No module named '<name>'`, in first-seen
/// order. Empty unless the report is a `ModuleNotFoundError`.
pub fn missing_modules(report: &str) -> Vec<String> {
    if !report.contains(MODULE_NOT_FOUND) {
        return Vec::new();
    }
    let mut names: Vec<String> = Vec::new();
    for cap in MISSING_MODULE_REGEX.captures_iter(report) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Install every missing module named in `report` once. Returns the names
/// that installed successfully. Does not re-run the validator.
pub async fn fix_module_not_found_error(
    report: &str,
    installer: &dyn DependencyInstaller,
) -> Vec<String> {
    let mut installed = Vec::new();
    for module in missing_modules(report) {
        match installer.install(&module).await {
            Ok(()) => installed.push(module),
            Err(e) => warn!(module = %module, error = %e, "Dependency install failed"),
        }
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInstaller {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl DependencyInstaller for RecordingInstaller {
        async fn install(&self, module: &str) -> Result<()> {
            self.calls.lock().unwrap().push(module.to_string());
            if self.fail_on == Some(module) {
                bail!("no such package");
            }
            Ok(())
        }
    }

    const REPORT: &str = "Traceback (most recent call last):\n  File \"main.py\", line 1\nModuleNotFoundError: No module named 'foo'\nModuleNotFoundError: No module named 'bar'\nModuleNotFoundError: No module named 'foo'\n";

    #[test]
    fn test_missing_modules_distinct_in_order() {
        assert_eq!(missing_modules(REPORT), vec!["foo", "bar"]);
    }

    #[test]
    fn test_missing_modules_requires_error_kind() {
        assert!(missing_modules("ImportError: No module named 'foo'").is_empty());
    }

    #[test]
    fn test_missing_modules_keeps_dotted_names() {
        let report = "ModuleNotFoundError: No module named 'google.protobuf'";
        assert_eq!(missing_modules(report), vec!["google.protobuf"]);
    }

    #[tokio::test]
    async fn test_fix_installs_each_module_once() {
        let installer = RecordingInstaller::default();
        let installed = fix_module_not_found_error(REPORT, &installer).await;
        assert_eq!(installed, vec!["foo", "bar"]);
        assert_eq!(*installer.calls.lock().unwrap(), vec!["foo", "bar"]);
    }

    #[tokio::test]
    async fn test_fix_skips_failed_installs() {
        let installer = RecordingInstaller {
            fail_on: Some("foo"),
            ..Default::default()
        };
        let installed = fix_module_not_found_error(REPORT, &installer).await;
        assert_eq!(installed, vec!["bar"]);
        assert_eq!(installer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fix_without_module_error_does_nothing() {
        let installer = RecordingInstaller::default();
        assert!(fix_module_not_found_error("SyntaxError", &installer).await.is_empty());
        assert!(installer.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pip_installer_reports_failure_status() {
        let installer = PipInstaller::new("false");
        assert!(installer.install("anything").await.is_err());
    }
}
