use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use devchain::config::CliOverrides;
use devchain::logging::{self, LogSettings};

mod cmd;

#[derive(Parser)]
#[command(name = "devchain")]
#[command(version, about = "Configuration-driven phase chain for building software with dialogue agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Working directory holding devchain.toml, company/ and the warehouse
    #[arg(long, global = true)]
    pub root_dir: Option<PathBuf>,

    /// Named company configuration (company/<name>/ or bundled)
    #[arg(long, global = true)]
    pub company: Option<String>,

    /// Directory containing ChatChainConfig.json, PhaseConfig.json and RoleConfig.json
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            company: self.company.clone(),
            config_dir: self.config_dir.clone(),
            ..CliOverrides::default()
        }
    }

    pub fn log_settings(&self, file: Option<PathBuf>) -> LogSettings {
        LogSettings {
            verbose: self.verbose,
            json: self.json_logs,
            file,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build software for a task by running the configured chain
    Run {
        /// Task description
        #[arg(short, long)]
        task: String,

        /// Project name
        #[arg(short, long)]
        name: Option<String>,

        /// Organization name
        #[arg(long)]
        org: Option<String>,

        /// Output root for generated projects
        #[arg(long)]
        warehouse: Option<PathBuf>,
    },
    /// Resolve the chain configuration without running it
    Check,
    /// Run a generated project once and report whether it has bugs
    Validate {
        /// Project directory to run
        dir: PathBuf,

        /// Install modules reported missing
        #[arg(long)]
        fix: bool,
    },
    /// View or validate devchain.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default devchain.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let root_dir = match cli.root_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            task,
            name,
            org,
            warehouse,
        } => {
            let overrides = CliOverrides {
                name: name.clone(),
                org: org.clone(),
                warehouse: warehouse.clone(),
                ..cli.overrides()
            };
            cmd::cmd_run(&cli, root_dir, overrides, task).await?;
        }
        Commands::Check => {
            logging::init(&cli.log_settings(None))?;
            cmd::cmd_check(&cli, root_dir)?;
        }
        Commands::Validate { dir, fix } => {
            logging::init(&cli.log_settings(None))?;
            cmd::cmd_validate(&cli, root_dir, dir, *fix).await?;
        }
        Commands::Config { command } => {
            logging::init(&cli.log_settings(None))?;
            cmd::cmd_config(&root_dir, command.clone())?;
        }
    }

    Ok(())
}
