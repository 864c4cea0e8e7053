//! `{placeholder}` substitution for role and phase prompts.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Values available to a prompt, keyed by placeholder name.
pub type PromptValues = BTreeMap<&'static str, String>;

/// Replace every `{key}` whose key is in `values`. Unknown placeholders are
/// left untouched so literal braces in prompts survive.
pub fn fill(template: &str, values: &PromptValues) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_known_keys() {
        let mut values = PromptValues::new();
        values.insert("task", "build a calculator".to_string());
        values.insert("language", "Python".to_string());
        assert_eq!(
            fill("Task: {task}. Use {language}.", &values),
            "Task: build a calculator. Use Python."
        );
    }

    #[test]
    fn test_fill_leaves_unknown_placeholders() {
        let values = PromptValues::new();
        assert_eq!(fill("keep {this} and {}", &values), "keep {this} and {}");
    }

    #[test]
    fn test_fill_does_not_recurse_into_values() {
        let mut values = PromptValues::new();
        values.insert("codes", "print('{task}')".to_string());
        values.insert("task", "x".to_string());
        assert_eq!(fill("{codes}", &values), "print('{task}')");
    }
}
