//! Runtime settings read from `devchain.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags. Every key is
//! optional; a missing file yields the defaults below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//! org = "DefaultOrg"
//! warehouse = "WareHouse"
//!
//! [model]
//! base_url = "https://api.openai.com/v1"
//! name = "gpt-3.5-turbo"
//! api_key_env = "OPENAI_API_KEY"
//! temperature = 0.2
//!
//! [validator]
//! runtime = "python3"
//! entry_point = "main.py"
//! grace_period_secs = 3
//! install_program = "pip"
//!
//! [images]
//! enabled = true
//! size = "256x256"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "devchain.toml";

/// Project naming and output location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Default project name when none is given on the command line
    #[serde(default = "default_project_name")]
    pub name: String,
    #[serde(default = "default_org")]
    pub org: String,
    /// Output root, relative to the working directory
    #[serde(default = "default_warehouse")]
    pub warehouse: String,
}

fn default_project_name() -> String {
    "my-app".to_string()
}

fn default_org() -> String {
    "DefaultOrg".to_string()
}

fn default_warehouse() -> String {
    "WareHouse".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            org: default_org(),
            warehouse: default_warehouse(),
        }
    }
}

/// The chat-completions backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
        }
    }
}

/// How the produced program is run and repaired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSection {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Seconds the program may run before it is considered healthy
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Package installer, invoked as `<install_program> install <module>`
    #[serde(default = "default_install_program")]
    pub install_program: String,
}

fn default_runtime() -> String {
    "python3".to_string()
}

fn default_entry_point() -> String {
    "main.py".to_string()
}

fn default_grace_period_secs() -> u64 {
    3
}

fn default_install_program() -> String {
    "pip".to_string()
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            entry_point: default_entry_point(),
            grace_period_secs: default_grace_period_secs(),
            install_program: default_install_program(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesSection {
    #[serde(default = "default_images_enabled")]
    pub enabled: bool,
    #[serde(default = "default_image_size")]
    pub size: String,
}

fn default_images_enabled() -> bool {
    true
}

fn default_image_size() -> String {
    "256x256".to_string()
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            enabled: default_images_enabled(),
            size: default_image_size(),
        }
    }
}

/// Root of `devchain.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevchainToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub validator: ValidatorSection,
    #[serde(default)]
    pub images: ImagesSection,
}

impl DevchainToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse devchain.toml")
    }

    /// Load `devchain.toml` from `dir`, or the defaults if it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize devchain.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `DEVCHAIN_MODEL`, `DEVCHAIN_BASE_URL` and `DEVCHAIN_RUNTIME`
    /// from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = get("DEVCHAIN_MODEL") {
            self.model.name = model;
        }
        if let Some(base_url) = get("DEVCHAIN_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(runtime) = get("DEVCHAIN_RUNTIME") {
            self.validator.runtime = runtime;
        }
        self
    }

    /// Return warnings for suspicious values.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(0.0..=2.0).contains(&self.model.temperature) {
            warnings.push(format!(
                "temperature {} is outside the usual range 0.0-2.0",
                self.model.temperature
            ));
        }
        if self.validator.grace_period_secs == 0 {
            warnings.push(
                "grace_period_secs = 0 gives the program no time to start".to_string(),
            );
        }
        if !is_valid_image_size(&self.images.size) {
            warnings.push(format!(
                "Invalid image size '{}': expected WIDTHxHEIGHT",
                self.images.size
            ));
        }
        if self.project.warehouse.trim().is_empty() {
            warnings.push("warehouse must not be empty".to_string());
        }

        warnings
    }
}

fn is_valid_image_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok(),
        None => false,
    }
}
