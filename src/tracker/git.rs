use anyhow::{Context, Result};
use git2::{Repository, Signature};
use std::path::Path;

/// Commits the generated project tree after each code rewrite.
pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    /// Open the repository at `project_dir`, initializing one if none exists.
    pub fn open_or_init(project_dir: &Path) -> Result<Self> {
        let repo = match Repository::open(project_dir) {
            Ok(repo) => repo,
            Err(_) => Repository::init(project_dir).with_context(|| {
                format!("Failed to init git repository at {}", project_dir.display())
            })?,
        };
        Ok(Self { repo })
    }

    /// Stage everything and commit it as code version `version`.
    pub fn commit_version(&self, version: u32) -> Result<String> {
        let mut index = self.repo.index()?;

        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let sig = Signature::now("devchain", "devchain@localhost")?;
        let message = format!("v{}", version);

        // Unborn branch on the first rewrite
        let commit_id = if let Some(parent) = self.head_commit() {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?
        } else {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, &message, &tree, &[])?
        };

        Ok(commit_id.to_string())
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize> {
        if self.head_commit().is_none() {
            return Ok(0);
        }
        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        Ok(walk.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_version_on_fresh_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();

        let tracker = GitTracker::open_or_init(dir.path()).unwrap();
        assert_eq!(tracker.commit_count().unwrap(), 0);

        let sha = tracker.commit_version(1).unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(tracker.commit_count().unwrap(), 1);
    }

    #[test]
    fn test_commit_version_appends_history() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('a')\n").unwrap();
        let tracker = GitTracker::open_or_init(dir.path()).unwrap();
        tracker.commit_version(1).unwrap();

        std::fs::write(dir.path().join("main.py"), "print('b')\n").unwrap();
        let reopened = GitTracker::open_or_init(dir.path()).unwrap();
        reopened.commit_version(2).unwrap();
        assert_eq!(reopened.commit_count().unwrap(), 2);
    }
}
