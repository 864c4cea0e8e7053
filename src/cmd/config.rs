//! Configuration view and validation commands: `devchain config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(root_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use devchain::devchain_config::{CONFIG_FILE, DevchainToml};

    let config_path = root_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Devchain Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                DevchainToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                DevchainToml::default()
            };
            println!();

            println!("[project]");
            println!("  name = \"{}\"", toml.project.name);
            println!("  org = \"{}\"", toml.project.org);
            println!("  warehouse = \"{}\"", toml.project.warehouse);
            println!();
            println!("[model]");
            println!("  base_url = \"{}\"", toml.model.base_url);
            println!("  name = \"{}\"", toml.model.name);
            println!("  api_key_env = \"{}\"", toml.model.api_key_env);
            println!("  temperature = {}", toml.model.temperature);
            println!();
            println!("[validator]");
            println!("  runtime = \"{}\"", toml.validator.runtime);
            println!("  entry_point = \"{}\"", toml.validator.entry_point);
            println!("  grace_period_secs = {}", toml.validator.grace_period_secs);
            println!("  install_program = \"{}\"", toml.validator.install_program);
            println!();
            println!("[images]");
            println!("  enabled = {}", toml.images.enabled);
            println!("  size = \"{}\"", toml.images.size);
            println!();

            let effective = toml.with_env_overrides();
            println!("Effective values (with env overrides):");
            println!("  model = \"{}\"", effective.model.name);
            println!("  base_url = \"{}\"", effective.model.base_url);
            println!("  runtime = \"{}\"", effective.validator.runtime);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = DevchainToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            DevchainToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, org, warehouse");
            println!("  - [model] base_url, name, api_key_env");
            println!("  - [validator] runtime, entry_point, grace_period_secs");
            println!();
        }
    }

    Ok(())
}
