//! Generated source tree held by the project environment.
//!
//! Dialogue output carries files as fenced blocks preceded by a line naming
//! the file:
//!
//! ```text
//! main.py
//! ```python
//! print("hello")
//! ```
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::tracker::GitTracker;

static CODE_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(.+?)\n```.*?\n(.*?)```").unwrap());

static FILENAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+\.\w+)").unwrap());

static CLASS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class (\S+?):\n").unwrap());

/// Placeholder text models emit instead of real code.
const PLACEHOLDER_MARKER: &str = "CODE";

/// Blocks containing this are always the program entry point.
const ENTRY_MARKER: &str = "__main__";

#[derive(Debug, Clone, Default)]
pub struct Codes {
    directory: Option<PathBuf>,
    files: BTreeMap<String, String>,
    version: u32,
    entry_point: String,
}

impl Codes {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            ..Self::default()
        }
    }

    pub fn set_directory(&mut self, directory: &Path) {
        self.directory = Some(directory.to_path_buf());
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Parse fenced code blocks out of `generated` and merge them into the
    /// tree. Returns the number of files added or changed.
    pub fn update(&mut self, generated: &str) -> usize {
        let mut changed = 0;
        for cap in CODE_BLOCK_REGEX.captures_iter(generated) {
            let header = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let code = cap.get(2).map(|m| m.as_str()).unwrap_or("");

            if code.contains(PLACEHOLDER_MARKER) {
                continue;
            }

            let filename = if code.contains(ENTRY_MARKER) && !self.entry_point.is_empty() {
                Some(self.entry_point.clone())
            } else {
                filename_from_header(header).or_else(|| filename_from_code(code))
            };
            let Some(filename) = filename else {
                debug!("Skipping code block without a resolvable filename");
                continue;
            };

            let formatted = format_code(code);
            if formatted.is_empty() {
                continue;
            }

            match self.files.get(&filename) {
                Some(existing) if existing == &formatted => {}
                Some(existing) => {
                    debug!(
                        file = %filename,
                        before = existing.lines().count(),
                        after = formatted.lines().count(),
                        "Updated code file"
                    );
                    self.files.insert(filename, formatted);
                    changed += 1;
                }
                None => {
                    debug!(file = %filename, "Added code file");
                    self.files.insert(filename, formatted);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Write every file to the project directory and bump the version.
    pub fn rewrite(&mut self, git_management: bool) -> Result<()> {
        let directory = self
            .directory
            .clone()
            .context("Codes directory has not been set")?;

        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;

        self.version += 1;
        for (filename, content) in &self.files {
            let path = directory.join(filename);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(path = %path.display(), "Wrote");
        }
        info!(version = self.version, files = self.files.len(), "Rewrote codes");

        if git_management {
            let tracker = GitTracker::open_or_init(&directory)?;
            let sha = tracker.commit_version(self.version)?;
            debug!(commit = %sha, "Committed code version");
        }
        Ok(())
    }

    /// Render the tree in the same fenced format the dialogue produces.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for (filename, content) in &self.files {
            let lang = Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(language_for_extension)
                .unwrap_or("");
            out.push_str(&format!("{}\n```{}\n{}\n```\n\n", filename, lang, content));
        }
        out
    }

    /// First file that still contains a bare `pass` statement and has been
    /// attempted fewer than `max_attempts` times.
    pub fn unimplemented_file(
        &self,
        attempts: &BTreeMap<String, u32>,
        max_attempts: u32,
    ) -> Option<String> {
        self.files
            .iter()
            .filter(|(name, _)| name.ends_with(".py"))
            .find(|(name, content)| {
                content.lines().any(|l| l.trim() == "pass")
                    && attempts.get(*name).copied().unwrap_or(0) < max_attempts
            })
            .map(|(name, _)| name.clone())
    }
}

/// The last `name.ext` token on the lines preceding a fence, lowercased.
fn filename_from_header(header: &str) -> Option<String> {
    FILENAME_REGEX
        .find_iter(header)
        .last()
        .map(|m| m.as_str().to_lowercase())
}

/// Fall back to the last class name declared in the block.
fn filename_from_code(code: &str) -> Option<String> {
    CLASS_REGEX
        .captures_iter(code)
        .last()
        .and_then(|cap| cap.get(1))
        .map(|m| {
            let class = m.as_str().split('(').next().unwrap_or("").to_lowercase();
            format!("{}.py", class)
        })
        .filter(|name| name != ".py")
}

fn format_code(code: &str) -> String {
    code.lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "html" => "html",
        "css" => "css",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TWO_FILES: &str = "Here is the implementation.\n\nmain.py\n```python\nimport game\n\nif __name__ == \"__main__\":\n    game.run()\n```\n\ngame.py\n```python\ndef run():\n    print('running')\n```\n";

    #[test]
    fn test_update_parses_named_blocks() {
        let mut codes = Codes::new("main.py");
        let changed = codes.update(TWO_FILES);
        assert_eq!(changed, 2);
        assert!(codes.files().contains_key("main.py"));
        assert_eq!(
            codes.files().get("game.py").unwrap(),
            "def run():\n    print('running')"
        );
    }

    #[test]
    fn test_update_strips_blank_lines() {
        let mut codes = Codes::new("main.py");
        codes.update(TWO_FILES);
        assert!(!codes.files().get("main.py").unwrap().contains("\n\n"));
    }

    #[test]
    fn test_update_skips_placeholder_blocks() {
        let mut codes = Codes::new("main.py");
        let changed = codes.update("utils.py\n```python\nCODE\n```\n");
        assert_eq!(changed, 0);
        assert!(codes.is_empty());
    }

    #[test]
    fn test_update_uses_class_name_when_header_has_no_filename() {
        let mut codes = Codes::new("main.py");
        codes.update("Below is the board.\n```python\nclass Board:\n    size = 3\n```\n");
        assert!(codes.files().contains_key("board.py"));
    }

    #[test]
    fn test_update_unchanged_content_is_not_counted() {
        let mut codes = Codes::new("main.py");
        codes.update(TWO_FILES);
        assert_eq!(codes.update(TWO_FILES), 0);
    }

    #[test]
    fn test_rewrite_writes_files_and_bumps_version() {
        let dir = tempdir().unwrap();
        let mut codes = Codes::new("main.py");
        codes.set_directory(dir.path());
        codes.update(TWO_FILES);

        codes.rewrite(false).unwrap();
        assert_eq!(codes.version(), 1);
        assert!(dir.path().join("main.py").exists());
        assert!(dir.path().join("game.py").exists());

        codes.rewrite(false).unwrap();
        assert_eq!(codes.version(), 2);
    }

    #[test]
    fn test_rewrite_without_directory_fails() {
        let mut codes = Codes::new("main.py");
        codes.update(TWO_FILES);
        assert!(codes.rewrite(false).is_err());
        assert_eq!(codes.version(), 0);
    }

    #[test]
    fn test_joined_roundtrips_through_update() {
        let mut codes = Codes::new("main.py");
        codes.update(TWO_FILES);
        let mut reparsed = Codes::new("main.py");
        reparsed.update(&codes.joined());
        assert_eq!(codes.files(), reparsed.files());
    }

    #[test]
    fn test_unimplemented_file_respects_attempts() {
        let mut codes = Codes::new("main.py");
        codes.update("stub.py\n```python\ndef todo():\n    pass\n```\n");
        let mut attempts = BTreeMap::new();
        assert_eq!(codes.unimplemented_file(&attempts, 2).as_deref(), Some("stub.py"));
        attempts.insert("stub.py".to_string(), 2);
        assert!(codes.unimplemented_file(&attempts, 2).is_none());
    }
}
