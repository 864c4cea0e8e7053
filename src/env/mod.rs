//! Shared project environment threaded through every phase of a run.
//!
//! The orchestrator owns exactly one [`ProjectEnvironment`] per run. Phases
//! receive it mutably and apply their updates to a clone first, so a failing
//! phase leaves the original untouched.

mod codes;
mod documents;
pub mod images;
pub mod meta;
mod roster;

pub use codes::Codes;
pub use documents::{DocLayout, Documents};
pub use images::ImageMap;
pub use meta::{write_meta, SoftwareInfo};
pub use roster::Roster;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::EnvironmentError;

pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const MANUAL_FILE: &str = "manual.md";

/// Environment switches copied from the chain configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub clear_structure: bool,
    pub brainstorming: bool,
    pub gui_design: bool,
    pub git_management: bool,
}

impl fmt::Display for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "clear_structure: {}", self.clear_structure)?;
        writeln!(f, "brainstorming: {}", self.brainstorming)?;
        writeln!(f, "gui_design: {}", self.gui_design)?;
        write!(f, "git_management: {}", self.git_management)
    }
}

/// Free-text fields phases read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchFields {
    pub task_prompt: String,
    pub modality: String,
    pub ideas: String,
    pub language: String,
    pub review_comments: String,
    pub error_summary: String,
    pub test_reports: String,
}

#[derive(Debug, Clone)]
pub struct ProjectEnvironment {
    pub config: EnvConfig,
    directory: Option<PathBuf>,
    pub scratch: ScratchFields,
    /// Last validation outcome; assumed buggy until a test phase says otherwise
    pub exist_bugs: bool,
    pub codes: Codes,
    pub requirements: Documents,
    pub manuals: Documents,
    pub proposed_images: ImageMap,
    pub incorporated_images: ImageMap,
    pub roster: Roster,
    /// Completion attempts per file, bounded by the code-complete action
    pub completion_attempts: BTreeMap<String, u32>,
}

impl ProjectEnvironment {
    pub fn new(config: EnvConfig, entry_point: &str) -> Self {
        Self {
            config,
            directory: None,
            scratch: ScratchFields::default(),
            exist_bugs: true,
            codes: Codes::new(entry_point),
            requirements: Documents::new(DocLayout::Fenced(REQUIREMENTS_FILE)),
            manuals: Documents::new(DocLayout::Whole(MANUAL_FILE)),
            proposed_images: ImageMap::new(),
            incorporated_images: ImageMap::new(),
            roster: Roster::new(),
            completion_attempts: BTreeMap::new(),
        }
    }

    pub fn directory(&self) -> Result<&Path, EnvironmentError> {
        self.directory
            .as_deref()
            .ok_or(EnvironmentError::DirectoryNotSet)
    }

    /// Bind the project directory. Binding is allowed once per run.
    pub fn set_directory(&mut self, directory: PathBuf) -> Result<(), EnvironmentError> {
        if let Some(current) = &self.directory {
            return Err(EnvironmentError::DirectoryAlreadySet {
                current: current.clone(),
                requested: directory,
            });
        }
        self.codes.set_directory(&directory);
        self.requirements.set_directory(&directory);
        self.manuals.set_directory(&directory);
        self.directory = Some(directory);
        Ok(())
    }

    /// Recruit a participant. Recruiting an existing name only warns.
    pub fn recruit(&mut self, name: &str) {
        if !self.roster.recruit(name) {
            warn!(agent = %name, "Recruitment skipped: {} already exists", name);
        }
    }

    pub fn exist_employee(&self, name: &str) -> bool {
        self.roster.contains(name)
    }

    /// Every incorporated and proposed image as `name: description` lines.
    pub fn images_summary(&self) -> String {
        self.incorporated_images
            .iter()
            .chain(self.proposed_images.iter())
            .map(|(name, desc)| format!("{}: {}", name, desc))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Make `directory` ready to receive a new project.
///
/// A non-empty existing directory is first copied to `<directory>.<stamp>`.
/// With `clear_structure` the directory is then emptied. Returns the backup
/// path when one was made.
pub fn prepare_directory(
    directory: &Path,
    clear_structure: bool,
    stamp: &str,
) -> Result<Option<PathBuf>> {
    let mut backup = None;
    let non_empty = directory.is_dir()
        && std::fs::read_dir(directory)
            .with_context(|| format!("Failed to read {}", directory.display()))?
            .next()
            .is_some();

    if non_empty {
        let target = PathBuf::from(format!("{}.{}", directory.display(), stamp));
        copy_tree(directory, &target)?;
        info!(from = %directory.display(), to = %target.display(), "Backed up existing project directory");
        backup = Some(target);
    }

    if clear_structure && directory.exists() {
        std::fs::remove_dir_all(directory)
            .with_context(|| format!("Failed to clear {}", directory.display()))?;
    }
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create {}", directory.display()))?;
    Ok(backup)
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn env() -> ProjectEnvironment {
        ProjectEnvironment::new(EnvConfig::default(), "main.py")
    }

    #[test]
    fn test_new_environment_defaults() {
        let env = env();
        assert!(env.exist_bugs);
        assert!(env.codes.is_empty());
        assert!(env.scratch.modality.is_empty());
        assert_eq!(env.directory(), Err(EnvironmentError::DirectoryNotSet));
    }

    #[test]
    fn test_set_directory_is_set_once() {
        let mut env = env();
        env.set_directory(PathBuf::from("/tmp/a")).unwrap();
        let err = env.set_directory(PathBuf::from("/tmp/b")).unwrap_err();
        assert_eq!(
            err,
            EnvironmentError::DirectoryAlreadySet {
                current: PathBuf::from("/tmp/a"),
                requested: PathBuf::from("/tmp/b"),
            }
        );
        assert_eq!(env.directory().unwrap(), Path::new("/tmp/a"));
    }

    #[test]
    fn test_recruit_twice_keeps_size() {
        let mut env = env();
        env.recruit("Programmer");
        env.recruit("Programmer");
        assert_eq!(env.roster.len(), 1);
        assert!(env.exist_employee("Programmer"));
        assert!(!env.exist_employee("Designer"));
    }

    #[test]
    fn test_images_summary_lists_both_maps() {
        let mut env = env();
        env.proposed_images
            .insert("ball.png".into(), "a ball".into());
        env.incorporated_images
            .insert("paddle.png".into(), "paddle".into());
        let summary = env.images_summary();
        assert!(summary.contains("ball.png: a ball"));
        assert!(summary.contains("paddle.png: paddle"));
    }

    #[test]
    fn test_env_config_display_lists_flags() {
        let config = EnvConfig {
            git_management: true,
            ..EnvConfig::default()
        };
        let text = config.to_string();
        assert!(text.contains("git_management: true"));
        assert!(text.contains("clear_structure: false"));
    }

    #[test]
    fn test_prepare_directory_backs_up_and_clears() {
        let root = tempdir().unwrap();
        let project = root.path().join("app");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("old.py"), "x = 1").unwrap();

        let backup = prepare_directory(&project, true, "20240101000000")
            .unwrap()
            .unwrap();
        assert!(backup.join("old.py").exists());
        assert!(project.exists());
        assert!(!project.join("old.py").exists());
    }

    #[test]
    fn test_prepare_directory_keeps_files_without_clear() {
        let root = tempdir().unwrap();
        let project = root.path().join("app");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("old.py"), "x = 1").unwrap();

        prepare_directory(&project, false, "stamp").unwrap();
        assert!(project.join("old.py").exists());
    }

    #[test]
    fn test_prepare_directory_creates_missing() {
        let root = tempdir().unwrap();
        let project = root.path().join("fresh");
        assert!(prepare_directory(&project, true, "stamp").unwrap().is_none());
        assert!(project.is_dir());
    }
}
