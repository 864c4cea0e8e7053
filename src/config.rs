use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::chain::{ChainConfig, CompanyConfig, RunOptions};
use crate::devchain_config::DevchainToml;
use crate::dialogue::{OpenAiImageGenerator, OpenAiSessionFactory, SessionFactory};
use crate::errors::{ConfigError, DialogueError};
use crate::phase::PhaseServices;
use crate::validator::PipInstaller;

/// Company used when none is named.
pub const DEFAULT_COMPANY: &str = "Default";

/// Command-line values that take precedence over `devchain.toml`.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub company: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub name: Option<String>,
    pub org: Option<String>,
    pub warehouse: Option<PathBuf>,
}

/// Runtime configuration for one invocation.
///
/// Layers `devchain.toml`, `DEVCHAIN_*` environment variables and CLI flags,
/// and resolves every path against the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub root_dir: PathBuf,
    pub company: String,
    /// Explicit company directory; wins over `company`
    pub config_dir: Option<PathBuf>,
    pub project_name: String,
    pub org_name: String,
    pub warehouse: PathBuf,
    pub settings: DevchainToml,
}

impl Config {
    pub fn new(root_dir: PathBuf, overrides: CliOverrides) -> Result<Self> {
        let root_dir = root_dir
            .canonicalize()
            .context("Failed to resolve working directory")?;
        let settings = DevchainToml::load_or_default(&root_dir)?.with_env_overrides();
        Ok(Self::from_settings(root_dir, settings, overrides))
    }

    /// Build from already-loaded settings.
    pub fn from_settings(root_dir: PathBuf, settings: DevchainToml, overrides: CliOverrides) -> Self {
        let warehouse = overrides
            .warehouse
            .unwrap_or_else(|| PathBuf::from(&settings.project.warehouse));
        let warehouse = if warehouse.is_absolute() {
            warehouse
        } else {
            root_dir.join(warehouse)
        };
        let config_dir = overrides.config_dir.map(|dir| {
            if dir.is_absolute() {
                dir
            } else {
                root_dir.join(dir)
            }
        });

        Self {
            company: overrides
                .company
                .unwrap_or_else(|| DEFAULT_COMPANY.to_string()),
            config_dir,
            project_name: overrides
                .name
                .unwrap_or_else(|| settings.project.name.clone()),
            org_name: overrides.org.unwrap_or_else(|| settings.project.org.clone()),
            warehouse,
            root_dir,
            settings,
        }
    }

    /// Load the company configuration: the explicit directory if given,
    /// otherwise `<root>/company/<name>`, otherwise the bundled one.
    pub fn load_company(&self) -> Result<CompanyConfig, ConfigError> {
        match &self.config_dir {
            Some(dir) => CompanyConfig::load_dir(dir),
            None => CompanyConfig::resolve(&self.root_dir, &self.company),
        }
    }

    pub fn run_options(&self, task: &str) -> RunOptions {
        RunOptions::new(
            &self.project_name,
            &self.org_name,
            task,
            self.warehouse.clone(),
        )
    }

    /// Services backed by the configured model endpoint.
    pub fn phase_services(&self, chain: &ChainConfig) -> Result<PhaseServices, DialogueError> {
        let sessions: Arc<dyn SessionFactory> =
            Arc::new(OpenAiSessionFactory::from_settings(&self.settings.model)?);
        Ok(self.services_with(sessions, chain))
    }

    /// Services around an arbitrary dialogue backend.
    pub fn services_with(&self, sessions: Arc<dyn SessionFactory>, chain: &ChainConfig) -> PhaseServices {
        let mut services = PhaseServices::new(sessions)
            .with_validator(self.settings.validator.clone())
            .with_installer(Arc::new(PipInstaller::new(
                self.settings.validator.install_program.clone(),
            )))
            .with_background_prompt(chain.background_prompt.clone());
        if self.settings.images.enabled {
            match OpenAiImageGenerator::from_settings(&self.settings.model) {
                Ok(images) => {
                    services = services.with_images(Arc::new(images), &self.settings.images.size)
                }
                Err(e) => tracing::warn!(error = %e, "Image generation disabled"),
            }
        }
        services
    }
}
