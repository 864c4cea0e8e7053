//! Full chain execution: `devchain run`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;

pub async fn cmd_run(
    cli: &Cli,
    root_dir: PathBuf,
    overrides: devchain::config::CliOverrides,
    task: &str,
) -> Result<()> {
    use devchain::chain::{ChainPlan, ChatChain, relocate_log};
    use devchain::config::Config;
    use devchain::logging;
    use devchain::phase::PhaseRegistry;

    if task.trim().is_empty() {
        anyhow::bail!("Task must not be empty. Pass --task \"<what to build>\".");
    }

    let config = Config::new(root_dir, overrides)?;
    let company = config.load_company()?;
    let registry = PhaseRegistry::from_company(&company.phases, &company.roles)?;
    // Resolve every phase before credentials, the log file or the project
    // directory are needed.
    let plan = ChainPlan::compile(&company.chain.chain, &registry)?;

    let options = config.run_options(task);
    let services = config.phase_services(&company.chain)?;
    let mut chain = ChatChain::with_registry(company, registry, services, options.clone());

    let guard = logging::init(&cli.log_settings(Some(options.log_path())))?;

    println!();
    println!("{}", console::style("devchain").bold().cyan());
    println!("  project:   {}", options.project_name);
    println!("  org:       {}", options.org_name);
    println!("  steps:     {}", plan.len());
    println!("  directory: {}", options.project_dir().display());
    println!();

    let result = chain.run().await;
    drop(guard);
    let log = relocate_log(&options.log_path(), &options.project_dir())?;

    match result {
        Ok(software) => {
            println!("{} {}", console::style("Done:").green().bold(), software);
            if let Some(log) = log {
                println!("  log: {}", console::style(log.display()).dim());
            }
            Ok(())
        }
        Err(e) => {
            println!("  {} {}", console::style("Error:").red().bold(), e);
            Err(e.into())
        }
    }
}
