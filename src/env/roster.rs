use serde::{Deserialize, Serialize};

/// Participants recruited for a run, in recruitment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    agents: Vec<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` to the roster. Returns `false` if it was already present.
    pub fn recruit(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.agents.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.iter().any(|a| a == name)
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recruit_adds_new_names_in_order() {
        let mut roster = Roster::new();
        assert!(roster.recruit("Chief Executive Officer"));
        assert!(roster.recruit("Programmer"));
        assert_eq!(roster.agents(), &["Chief Executive Officer", "Programmer"]);
    }

    #[test]
    fn test_recruit_is_idempotent() {
        let mut roster = Roster::new();
        roster.recruit("Programmer");
        assert!(!roster.recruit("Programmer"));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_contains() {
        let mut roster = Roster::new();
        assert!(!roster.contains("Code Reviewer"));
        roster.recruit("Code Reviewer");
        assert!(roster.contains("Code Reviewer"));
        assert!(!roster.contains("code reviewer"));
    }
}
