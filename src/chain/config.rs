//! Company configuration: the three JSON records describing one run style.
//!
//! - `ChatChainConfig.json`: the chain of phases plus run switches
//! - `PhaseConfig.json`: roles and prompt for every simple phase
//! - `RoleConfig.json`: system prompt lines for every role
//!
//! Boolean switches accept JSON booleans as well as `"True"`/`"False"`
//! strings. Unknown keys in the chain record are kept and echoed back in
//! [`ChainConfig::render`].

use rust_embed::RustEmbed;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::env::EnvConfig;
use crate::errors::ConfigError;

pub const CHAIN_CONFIG_FILE: &str = "ChatChainConfig.json";
pub const PHASE_CONFIG_FILE: &str = "PhaseConfig.json";
pub const ROLE_CONFIG_FILE: &str = "RoleConfig.json";

pub const CONFIG_FILES: [&str; 3] = [CHAIN_CONFIG_FILE, PHASE_CONFIG_FILE, ROLE_CONFIG_FILE];

/// Company configurations compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/company/"]
struct BundledCompanies;

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientBool {
    Bool(bool),
    Text(String),
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match LenientBool::deserialize(deserializer)? {
        LenientBool::Bool(b) => Ok(b),
        LenientBool::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected true/false or \"True\"/\"False\", got \"{}\"",
                other
            ))),
        },
    }
}

/// One entry of the `chain` list, or of a `Composition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    pub phase: String,
    #[serde(rename = "phaseType")]
    pub phase_type: String,
    /// Turn limit; zero or negative selects the default
    #[serde(default)]
    pub max_turn_step: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub need_reflect: bool,
    #[serde(rename = "cycleNum", default, skip_serializing_if = "Option::is_none")]
    pub cycle_num: Option<u32>,
    #[serde(rename = "Composition", default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<Vec<ChainStep>>,
}

impl ChainStep {
    pub fn simple(phase: &str, max_turn_step: i64, need_reflect: bool) -> Self {
        Self {
            phase: phase.to_string(),
            phase_type: "SimplePhase".to_string(),
            max_turn_step,
            need_reflect,
            cycle_num: None,
            composition: None,
        }
    }

    pub fn composed(phase: &str, cycle_num: u32, composition: Vec<ChainStep>) -> Self {
        Self {
            phase: phase.to_string(),
            phase_type: "ComposedPhase".to_string(),
            max_turn_step: 0,
            need_reflect: false,
            cycle_num: Some(cycle_num),
            composition: Some(composition),
        }
    }
}

/// `ChatChainConfig.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain: Vec<ChainStep>,
    #[serde(default)]
    pub recruitments: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub clear_structure: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub gui_design: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub brainstorming: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub git_management: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub self_improve: bool,
    /// Shared preamble available to prompts as `{background_prompt}`
    #[serde(default)]
    pub background_prompt: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChainConfig {
    pub fn new(chain: Vec<ChainStep>) -> Self {
        Self {
            chain,
            recruitments: Vec::new(),
            clear_structure: false,
            gui_design: false,
            brainstorming: false,
            git_management: false,
            self_improve: false,
            background_prompt: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn env_config(&self) -> EnvConfig {
        EnvConfig {
            clear_structure: self.clear_structure,
            brainstorming: self.brainstorming,
            gui_design: self.gui_design,
            git_management: self.git_management,
        }
    }

    /// Every switch and unknown key as `key: value` lines.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("clear_structure: {}", self.clear_structure),
            format!("gui_design: {}", self.gui_design),
            format!("brainstorming: {}", self.brainstorming),
            format!("git_management: {}", self.git_management),
            format!("self_improve: {}", self.self_improve),
            format!("recruitments: {}", self.recruitments.join(", ")),
        ];
        for (key, value) in &self.extra {
            lines.push(format!("{}: {}", key, value));
        }
        lines.join("\n")
    }
}

/// One entry of `PhaseConfig.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfigEntry {
    pub assistant_role_name: String,
    pub user_role_name: String,
    pub phase_prompt: Vec<String>,
    /// Environment target for phases without a built-in action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl PhaseConfigEntry {
    pub fn prompt(&self) -> String {
        self.phase_prompt.join("\n\n")
    }
}

/// Where a company configuration was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanySource {
    Directory(PathBuf),
    Bundled(String),
}

impl std::fmt::Display for CompanySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompanySource::Directory(path) => write!(f, "{}", path.display()),
            CompanySource::Bundled(name) => write!(f, "bundled:{}", name),
        }
    }
}

/// The three configuration records for one run.
#[derive(Debug, Clone)]
pub struct CompanyConfig {
    pub chain: ChainConfig,
    pub phases: BTreeMap<String, PhaseConfigEntry>,
    pub roles: BTreeMap<String, Vec<String>>,
    pub source: CompanySource,
    raw: BTreeMap<&'static str, String>,
}

impl CompanyConfig {
    /// Load the three files from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut raw = BTreeMap::new();
        for file in CONFIG_FILES {
            let path = dir.join(file);
            let content = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::ReadFailed { path, source })?;
            raw.insert(file, content);
        }
        Self::from_raw(raw, CompanySource::Directory(dir.to_path_buf()), dir)
    }

    /// Load a company compiled into the binary.
    pub fn load_bundled(name: &str) -> Result<Self, ConfigError> {
        let mut raw = BTreeMap::new();
        for file in CONFIG_FILES {
            let asset = BundledCompanies::get(&format!("{}/{}", name, file))
                .ok_or_else(|| ConfigError::CompanyNotFound(name.to_string()))?;
            raw.insert(file, String::from_utf8_lossy(&asset.data).into_owned());
        }
        let origin = PathBuf::from(format!("bundled:{}", name));
        Self::from_raw(raw, CompanySource::Bundled(name.to_string()), &origin)
    }

    /// Resolve `company` against `<root>/company/<name>` first, then the
    /// bundled set.
    pub fn resolve(root: &Path, company: &str) -> Result<Self, ConfigError> {
        let dir = root.join("company").join(company);
        if dir.join(CHAIN_CONFIG_FILE).is_file() {
            Self::load_dir(&dir)
        } else {
            Self::load_bundled(company)
        }
    }

    /// Names of the bundled companies.
    pub fn bundled_names() -> Vec<String> {
        let mut names: Vec<String> = BundledCompanies::iter()
            .filter_map(|path| path.split('/').next().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn from_raw(
        raw: BTreeMap<&'static str, String>,
        source: CompanySource,
        origin: &Path,
    ) -> Result<Self, ConfigError> {
        let parse_failed = |file: &str| {
            let path = origin.join(file);
            move |source: serde_json::Error| ConfigError::ParseFailed { path, source }
        };
        let chain: ChainConfig = serde_json::from_str(&raw[CHAIN_CONFIG_FILE])
            .map_err(parse_failed(CHAIN_CONFIG_FILE))?;
        let phases: BTreeMap<String, PhaseConfigEntry> =
            serde_json::from_str(&raw[PHASE_CONFIG_FILE])
            .map_err(parse_failed(PHASE_CONFIG_FILE))?;
        let roles: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw[ROLE_CONFIG_FILE])
            .map_err(parse_failed(ROLE_CONFIG_FILE))?;
        Ok(Self {
            chain,
            phases,
            roles,
            source,
            raw,
        })
    }

    /// Write the three records, as originally read, into `dir`.
    pub fn copy_into(&self, dir: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        for (file, content) in &self.raw {
            let path = dir.join(file);
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CHAIN: &str = r#"{
        "chain": [
            {"phase": "DemandAnalysis", "phaseType": "SimplePhase", "max_turn_step": -1, "need_reflect": "True"},
            {"phase": "CodeReview", "phaseType": "ComposedPhase", "cycleNum": 3,
             "Composition": [
                {"phase": "CodeReviewComment", "phaseType": "SimplePhase", "max_turn_step": 1, "need_reflect": "False"}
             ]}
        ],
        "recruitments": ["Chief Executive Officer", "Programmer"],
        "clear_structure": "True",
        "gui_design": true,
        "brainstorming": "False",
        "web_spider": "False"
    }"#;

    #[test]
    fn test_chain_config_lenient_bools() {
        let config: ChainConfig = serde_json::from_str(CHAIN).unwrap();
        assert!(config.clear_structure);
        assert!(config.gui_design);
        assert!(!config.brainstorming);
        assert!(!config.self_improve);
        assert!(config.chain[0].need_reflect);
        assert_eq!(config.chain[0].max_turn_step, -1);
    }

    #[test]
    fn test_chain_config_composed_step() {
        let config: ChainConfig = serde_json::from_str(CHAIN).unwrap();
        let composed = &config.chain[1];
        assert_eq!(composed.phase_type, "ComposedPhase");
        assert_eq!(composed.cycle_num, Some(3));
        assert_eq!(composed.composition.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_chain_config_keeps_unknown_keys() {
        let config: ChainConfig = serde_json::from_str(CHAIN).unwrap();
        assert_eq!(config.extra["web_spider"], "False");
        assert!(config.render().contains("web_spider: \"False\""));
    }

    #[test]
    fn test_chain_config_rejects_garbage_bool() {
        let err = serde_json::from_str::<ChainConfig>(r#"{"chain": [], "clear_structure": "maybe"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_phase_prompt_joined_with_blank_line() {
        let entry: PhaseConfigEntry = serde_json::from_str(
            r#"{"assistant_role_name": "CTO", "user_role_name": "CEO", "phase_prompt": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(entry.prompt(), "a\n\nb");
        assert!(entry.output.is_none());
    }

    #[test]
    fn test_load_dir_missing_file() {
        let dir = tempdir().unwrap();
        let err = CompanyConfig::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn test_load_dir_and_copy_into() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CHAIN_CONFIG_FILE), CHAIN).unwrap();
        std::fs::write(dir.path().join(PHASE_CONFIG_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(ROLE_CONFIG_FILE), r#"{"Programmer": ["You code."]}"#)
            .unwrap();

        let company = CompanyConfig::load_dir(dir.path()).unwrap();
        assert_eq!(company.roles["Programmer"], vec!["You code."]);

        let out = tempdir().unwrap();
        company.copy_into(out.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.path().join(CHAIN_CONFIG_FILE)).unwrap(),
            CHAIN
        );
    }

    #[test]
    fn test_load_dir_parse_error_names_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CHAIN_CONFIG_FILE), "{not json").unwrap();
        std::fs::write(dir.path().join(PHASE_CONFIG_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(ROLE_CONFIG_FILE), "{}").unwrap();
        let err = CompanyConfig::load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CHAIN_CONFIG_FILE));
    }

    #[test]
    fn test_bundled_default_loads() {
        let company = CompanyConfig::load_bundled("Default").unwrap();
        assert!(!company.chain.chain.is_empty());
        assert!(company.phases.contains_key("Coding"));
        assert!(CompanyConfig::bundled_names().contains(&"Default".to_string()));
    }

    #[test]
    fn test_bundled_unknown_company() {
        assert!(matches!(
            CompanyConfig::load_bundled("NoSuchCompany"),
            Err(ConfigError::CompanyNotFound(_))
        ));
    }
}
