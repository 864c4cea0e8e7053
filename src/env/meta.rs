use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::ProjectEnvironment;

pub const META_FILE: &str = "meta.txt";

/// Write `meta.txt` describing the run into the project directory.
///
/// `chain_config` is the rendered chain configuration, including any keys
/// the orchestrator does not interpret.
pub fn write_meta(env: &ProjectEnvironment, chain_config: &str) -> Result<PathBuf> {
    let directory = env.directory()?;
    let sections = [
        ("Task", env.scratch.task_prompt.clone()),
        ("Config", chain_config.to_string()),
        ("Roster", env.roster.agents().join(", ")),
        ("Modality", env.scratch.modality.clone()),
        ("Ideas", env.scratch.ideas.clone()),
        ("Language", env.scratch.language.clone()),
        ("Code_Version", env.codes.version().to_string()),
        ("Proposed_images", env.proposed_images.len().to_string()),
        ("Incorporated_images", env.incorporated_images.len().to_string()),
    ];

    let body: String = sections
        .iter()
        .map(|(key, value)| format!("{}:\n{}\n\n", key, value))
        .collect();

    let path = directory.join(META_FILE);
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Statistics about a finished project directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftwareInfo {
    pub code_files: usize,
    pub code_lines: usize,
    pub doc_files: usize,
    pub env_lines: usize,
    pub manual_lines: usize,
    pub images: usize,
    pub version: u32,
    pub duration_secs: f64,
}

impl SoftwareInfo {
    /// Scan `directory`. `version` and `duration_secs` come from the run.
    pub fn collect(directory: &Path, version: u32, duration_secs: f64) -> Self {
        let mut info = SoftwareInfo {
            version,
            duration_secs,
            ..Self::default()
        };

        for entry in WalkDir::new(directory)
            .into_iter()
            .filter_entry(|e| e.file_name() != "__pycache__" && e.file_name() != ".git")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            match path.extension().and_then(|e| e.to_str()) {
                Some("py") => {
                    info.code_files += 1;
                    info.code_lines += count_lines(path);
                }
                Some("png") => info.images += 1,
                Some("txt") | Some("md") => {
                    if name == super::REQUIREMENTS_FILE {
                        info.env_lines = count_lines(path);
                    } else if name == super::MANUAL_FILE {
                        info.manual_lines = count_lines(path);
                    }
                    if name != META_FILE {
                        info.doc_files += 1;
                    }
                }
                _ => {}
            }
        }
        info
    }
}

impl fmt::Display for SoftwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "code files: {}, code lines: {}, docs: {}, requirement lines: {}, manual lines: {}, images: {}, version: {}, duration: {:.2}s",
            self.code_files,
            self.code_lines,
            self.doc_files,
            self.env_lines,
            self.manual_lines,
            self.images,
            self.version,
            self.duration_secs
        )
    }
}

fn count_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|content| content.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}
