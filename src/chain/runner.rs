//! The chat chain: recruit, prepare the project directory, run every
//! configured phase in order, then write the run summary.

use anyhow::Context;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::config::CompanyConfig;
use super::improve::self_task_improve;
use super::plan::ChainPlan;
use crate::env::{ProjectEnvironment, SoftwareInfo, prepare_directory, write_meta};
use crate::errors::{ChainError, PhaseError};
use crate::phase::{PhaseRegistry, PhaseReport, PhaseServices};

/// Format of the run timestamp embedded in directory and log names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Warehouse entries with these extensions survive `clear_structure`.
const KEPT_EXTENSIONS: &[&str] = &["py", "log"];

/// Naming and location of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub project_name: String,
    pub org_name: String,
    pub task: String,
    pub warehouse: PathBuf,
    pub stamp: String,
}

impl RunOptions {
    /// Options stamped with the current local time.
    pub fn new(
        project_name: impl Into<String>,
        org_name: impl Into<String>,
        task: impl Into<String>,
        warehouse: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            org_name: org_name.into(),
            task: task.into(),
            warehouse: warehouse.into(),
            stamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = stamp.into();
        self
    }

    fn base_name(&self) -> String {
        format!("{}_{}_{}", self.project_name, self.org_name, self.stamp)
    }

    /// `<warehouse>/<project>_<org>_<stamp>`
    pub fn project_dir(&self) -> PathBuf {
        self.warehouse.join(self.base_name())
    }

    /// `<warehouse>/<project>_<org>_<stamp>.log`
    pub fn log_path(&self) -> PathBuf {
        self.warehouse.join(format!("{}.log", self.base_name()))
    }
}

pub struct ChatChain {
    company: CompanyConfig,
    registry: PhaseRegistry,
    services: PhaseServices,
    options: RunOptions,
    env: ProjectEnvironment,
    started: DateTime<Local>,
}

impl ChatChain {
    /// Build a chain whose registry holds one phase per configured entry.
    pub fn new(
        company: CompanyConfig,
        services: PhaseServices,
        options: RunOptions,
    ) -> Result<Self, ChainError> {
        let registry = PhaseRegistry::from_company(&company.phases, &company.roles)?;
        Ok(Self::with_registry(company, registry, services, options))
    }

    pub fn with_registry(
        company: CompanyConfig,
        registry: PhaseRegistry,
        services: PhaseServices,
        options: RunOptions,
    ) -> Self {
        let env = ProjectEnvironment::new(
            company.chain.env_config(),
            &services.validator.entry_point,
        );
        Self {
            company,
            registry,
            services,
            options,
            env,
            started: Local::now(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut PhaseRegistry {
        &mut self.registry
    }

    pub fn env(&self) -> &ProjectEnvironment {
        &self.env
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Resolve the configured chain without running anything.
    pub fn plan(&self) -> Result<ChainPlan, ChainError> {
        Ok(ChainPlan::compile(&self.company.chain.chain, &self.registry)?)
    }

    /// Recruit every configured participant.
    pub fn make_recruitment(&mut self) {
        for name in &self.company.chain.recruitments {
            self.env.recruit(name);
        }
    }

    /// Bind and populate the project directory and set the task prompt.
    pub async fn pre_processing(&mut self) -> Result<(), ChainError> {
        let clear_structure = self.company.chain.clear_structure;
        let warehouse = &self.options.warehouse;
        std::fs::create_dir_all(warehouse)
            .with_context(|| format!("Failed to create {}", warehouse.display()))?;
        if clear_structure {
            clean_warehouse(warehouse)?;
        }

        let directory = self.options.project_dir();
        prepare_directory(&directory, clear_structure, &self.options.stamp)?;
        self.env.set_directory(directory.clone())?;
        self.company.copy_into(&directory)?;

        let prompt_file = directory.join(format!("{}.prompt", self.options.project_name));
        std::fs::write(&prompt_file, &self.options.task)
            .with_context(|| format!("Failed to write {}", prompt_file.display()))?;

        info!(
            started = %self.options.stamp,
            company = %self.company.source,
            project = %self.options.project_name,
            org = %self.options.org_name,
            directory = %directory.display(),
            log_file = %self.options.log_path().display(),
            "Run configured"
        );
        info!(task = %self.options.task, "Task");
        info!("Environment:\n{}", self.env.config);

        self.env.scratch.task_prompt = if self.company.chain.self_improve {
            self_task_improve(self.services.sessions.as_ref(), &self.options.task)
                .await
                .map_err(|source| PhaseError::Dialogue {
                    phase: super::improve::SELF_IMPROVE_LABEL.to_string(),
                    source,
                })?
        } else {
            self.options.task.clone()
        };
        Ok(())
    }

    /// Compile the chain, then run each step in order. Nothing runs when any
    /// step fails to resolve.
    pub async fn execute_chain(&mut self) -> Result<Vec<PhaseReport>, ChainError> {
        let plan = self.plan()?;
        let mut reports = Vec::new();
        for step in plan.steps() {
            info!(phase = %step.name(), "Executing chain step");
            reports.extend(step.execute(&mut self.env, &self.services).await?);
        }
        Ok(reports)
    }

    /// Write `meta.txt`, log the software summary and clean caches.
    pub fn post_processing(&mut self) -> Result<SoftwareInfo, ChainError> {
        write_meta(&self.env, &self.company.chain.render())?;

        let finished = Local::now();
        let duration = (finished - self.started).num_milliseconds() as f64 / 1000.0;
        let directory = self.env.directory()?.to_path_buf();
        let software = SoftwareInfo::collect(&directory, self.env.codes.version(), duration);

        if self.company.chain.clear_structure {
            remove_pycache(&directory)?;
        }

        info!(
            started = %self.started.format(TIMESTAMP_FORMAT),
            finished = %finished.format(TIMESTAMP_FORMAT),
            "Software info: {}",
            software
        );
        Ok(software)
    }

    /// Full run. Returns the summary of the finished project.
    pub async fn run(&mut self) -> Result<SoftwareInfo, ChainError> {
        // Unresolvable names must fail before the directory is touched.
        self.plan()?;
        self.make_recruitment();
        self.pre_processing().await?;
        self.execute_chain().await?;
        self.post_processing()
    }
}

/// Move the run log into the project directory. Call after the log writer
/// has been flushed and dropped.
pub fn relocate_log(log_path: &Path, project_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !log_path.is_file() || !project_dir.is_dir() {
        return Ok(None);
    }
    let Some(file_name) = log_path.file_name() else {
        return Ok(None);
    };
    let target = project_dir.join(file_name);
    if std::fs::rename(log_path, &target).is_err() {
        std::fs::copy(log_path, &target)
            .with_context(|| format!("Failed to copy log to {}", target.display()))?;
        std::fs::remove_file(log_path)
            .with_context(|| format!("Failed to remove {}", log_path.display()))?;
    }
    Ok(Some(target))
}

/// Remove top-level warehouse files that are neither sources nor logs.
fn clean_warehouse(warehouse: &Path) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(warehouse)
        .with_context(|| format!("Failed to read {}", warehouse.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let keep = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| KEPT_EXTENSIONS.contains(&ext));
        if !keep {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            info!(file = %path.display(), "Removed stray warehouse file");
        }
    }
    Ok(())
}

fn remove_pycache(directory: &Path) -> anyhow::Result<()> {
    let caches: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.file_name() == "__pycache__")
        .map(|e| e.into_path())
        .collect();
    for cache in caches {
        if let Err(e) = std::fs::remove_dir_all(&cache) {
            warn!(path = %cache.display(), error = %e, "Failed to remove cache directory");
        }
    }
    Ok(())
}
