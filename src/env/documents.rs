use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static DOC_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap());

/// How generated text is turned into document files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocLayout {
    /// Every fenced block becomes the content of the named file.
    Fenced(&'static str),
    /// The whole text becomes the named file.
    Whole(&'static str),
}

/// A document collection (requirements, manuals) with the raw text it was
/// derived from.
#[derive(Debug, Clone)]
pub struct Documents {
    directory: Option<PathBuf>,
    layout: DocLayout,
    raw: String,
    files: BTreeMap<String, String>,
}

impl Documents {
    pub fn new(layout: DocLayout) -> Self {
        Self {
            directory: None,
            layout,
            raw: String::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn set_directory(&mut self, directory: &Path) {
        self.directory = Some(directory.to_path_buf());
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Accumulate `generated` and re-derive the per-file breakdown from it.
    /// Returns the number of files touched.
    pub fn update(&mut self, generated: &str) -> usize {
        if !self.raw.is_empty() {
            self.raw.push_str("\n\n");
        }
        self.raw.push_str(generated);

        let mut touched = 0;
        match self.layout {
            DocLayout::Fenced(filename) => {
                for cap in DOC_BLOCK_REGEX.captures_iter(generated) {
                    if let Some(doc) = cap.get(1) {
                        self.files.insert(filename.to_string(), doc.as_str().to_string());
                        touched += 1;
                    }
                }
            }
            DocLayout::Whole(filename) => {
                self.files.insert(filename.to_string(), generated.to_string());
                touched += 1;
            }
        }
        touched
    }

    pub fn rewrite(&self) -> Result<()> {
        let directory = self
            .directory
            .as_ref()
            .context("Documents directory has not been set")?;
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        for (filename, content) in &self.files {
            let path = directory.join(filename);
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(path = %path.display(), "Wrote document");
        }
        Ok(())
    }

    pub fn joined(&self) -> String {
        self.files
            .iter()
            .map(|(name, content)| format!("{}\n```\n{}\n```\n\n", name, content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fenced_layout_takes_block_content() {
        let mut docs = Documents::new(DocLayout::Fenced("requirements.txt"));
        let touched = docs.update("requirements.txt\n```\nnumpy==1.19.2\npandas>=1.1.4\n```\n");
        assert_eq!(touched, 1);
        assert_eq!(
            docs.files().get("requirements.txt").unwrap(),
            "numpy==1.19.2\npandas>=1.1.4\n"
        );
    }

    #[test]
    fn test_fenced_layout_ignores_plain_text() {
        let mut docs = Documents::new(DocLayout::Fenced("requirements.txt"));
        assert_eq!(docs.update("no dependencies needed"), 0);
        assert!(docs.is_empty());
        assert_eq!(docs.raw(), "no dependencies needed");
    }

    #[test]
    fn test_whole_layout_keeps_everything() {
        let mut docs = Documents::new(DocLayout::Whole("manual.md"));
        docs.update("# Manual\n\nRun `python main.py`.");
        assert_eq!(
            docs.files().get("manual.md").unwrap(),
            "# Manual\n\nRun `python main.py`."
        );
    }

    #[test]
    fn test_raw_accumulates_across_updates() {
        let mut docs = Documents::new(DocLayout::Whole("manual.md"));
        docs.update("first");
        docs.update("second");
        assert_eq!(docs.raw(), "first\n\nsecond");
        assert_eq!(docs.files().get("manual.md").unwrap(), "second");
    }

    #[test]
    fn test_rewrite_writes_files() {
        let dir = tempdir().unwrap();
        let mut docs = Documents::new(DocLayout::Whole("manual.md"));
        docs.set_directory(dir.path());
        docs.update("hello");
        docs.rewrite().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("manual.md")).unwrap(),
            "hello"
        );
    }
}
