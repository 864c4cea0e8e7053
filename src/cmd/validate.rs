//! One-off program check: `devchain validate <dir>`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::super::Cli;

pub async fn cmd_validate(cli: &Cli, root_dir: PathBuf, dir: &Path, fix: bool) -> Result<()> {
    use devchain::config::Config;
    use devchain::validator::{BuildValidator, PipInstaller, fix_module_not_found_error};

    let config = Config::new(root_dir, cli.overrides())?;
    let settings = &config.settings.validator;
    if !dir.is_dir() {
        anyhow::bail!("Project directory not found: {}", dir.display());
    }

    let validator = BuildValidator::new(dir, settings);
    let report = validator.exist_bugs().await;
    if !report.has_bug {
        println!(
            "{} {} ran without errors",
            console::style("OK:").green().bold(),
            settings.entry_point
        );
        return Ok(());
    }

    println!("{}", console::style("Bugs found:").red().bold());
    for line in report.message.lines() {
        println!("  {}", line);
    }

    if fix {
        let installer = PipInstaller::new(settings.install_program.clone());
        let installed = fix_module_not_found_error(&report.message, &installer).await;
        if installed.is_empty() {
            println!("{}", console::style("No missing modules to install.").yellow());
        } else {
            println!(
                "{} {}",
                console::style("Installed:").green(),
                installed.join(", ")
            );
        }
    }

    anyhow::bail!("{} reported errors", settings.entry_point)
}
