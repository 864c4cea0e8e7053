//! Name → phase resolution, built once per run.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::action::PhaseAction;
use super::composed::ComposedPolicy;
use super::simple::{RoleSpec, SimplePhase};
use crate::chain::config::PhaseConfigEntry;
use crate::errors::ConfigError;

const REFLECTION_ASSISTANT: &str = "Chief Executive Officer";
const REFLECTION_USER: &str = "Counselor";

#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    simple: BTreeMap<String, Arc<SimplePhase>>,
    composed: BTreeMap<String, ComposedPolicy>,
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseRegistry {
    /// A registry holding only the built-in composed policies.
    pub fn new() -> Self {
        let composed = ComposedPolicy::builtins()
            .into_iter()
            .map(|policy| (policy.name.clone(), policy))
            .collect();
        Self {
            simple: BTreeMap::new(),
            composed,
        }
    }

    /// Build one simple phase per phase-config entry.
    pub fn from_company(
        phases: &BTreeMap<String, PhaseConfigEntry>,
        roles: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        let reflection_assistant = RoleSpec::new(
            REFLECTION_ASSISTANT,
            optional_role_prompt(roles, REFLECTION_ASSISTANT),
        );
        let reflection_user =
            RoleSpec::new(REFLECTION_USER, optional_role_prompt(roles, REFLECTION_USER));

        for (name, entry) in phases {
            let action = PhaseAction::resolve(name, entry.output.as_deref())?;
            let assistant = RoleSpec::new(
                &entry.assistant_role_name,
                role_prompt(roles, name, &entry.assistant_role_name)?,
            );
            let user = RoleSpec::new(
                &entry.user_role_name,
                role_prompt(roles, name, &entry.user_role_name)?,
            );
            let phase = SimplePhase::new(name, assistant, user, entry.prompt(), action)
                .with_reflection_roles(reflection_assistant.clone(), reflection_user.clone());
            registry.register_simple(phase);
        }
        Ok(registry)
    }

    /// Register or replace a simple phase under its own name.
    pub fn register_simple(&mut self, phase: SimplePhase) {
        self.simple.insert(phase.name().to_string(), Arc::new(phase));
    }

    /// Register or replace a composed policy under its own name.
    pub fn register_composed(&mut self, policy: ComposedPolicy) {
        self.composed.insert(policy.name.clone(), policy);
    }

    pub fn simple(&self, name: &str) -> Result<Arc<SimplePhase>, ConfigError> {
        self.simple
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPhase {
                name: name.to_string(),
            })
    }

    pub fn composed(&self, name: &str) -> Result<&ComposedPolicy, ConfigError> {
        self.composed
            .get(name)
            .ok_or_else(|| ConfigError::UnknownComposedPhase {
                name: name.to_string(),
            })
    }

    pub fn simple_names(&self) -> Vec<&str> {
        self.simple.keys().map(String::as_str).collect()
    }

    pub fn composed_names(&self) -> Vec<&str> {
        self.composed.keys().map(String::as_str).collect()
    }
}

fn role_prompt(
    roles: &BTreeMap<String, Vec<String>>,
    phase: &str,
    role: &str,
) -> Result<String, ConfigError> {
    roles
        .get(role)
        .map(|lines| lines.join("\n"))
        .ok_or_else(|| ConfigError::UnknownRole {
            phase: phase.to_string(),
            role: role.to_string(),
        })
}

fn optional_role_prompt(roles: &BTreeMap<String, Vec<String>>, role: &str) -> String {
    roles
        .get(role)
        .map(|lines| lines.join("\n"))
        .unwrap_or_else(|| format!("You are {}.", role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::OutputTarget;

    fn entry(assistant: &str, user: &str, output: Option<&str>) -> PhaseConfigEntry {
        PhaseConfigEntry {
            assistant_role_name: assistant.to_string(),
            user_role_name: user.to_string(),
            phase_prompt: vec!["Do {task}.".to_string()],
            output: output.map(str::to_string),
        }
    }

    fn roles() -> BTreeMap<String, Vec<String>> {
        [
            ("Programmer", vec!["You write code.", "Be precise."]),
            ("Chief Technology Officer", vec!["You lead."]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
        .collect()
    }

    #[test]
    fn test_from_company_builds_phases() {
        let mut phases = BTreeMap::new();
        phases.insert(
            "Coding".to_string(),
            entry("Programmer", "Chief Technology Officer", None),
        );
        phases.insert(
            "Draft".to_string(),
            entry("Programmer", "Chief Technology Officer", Some("codes")),
        );

        let registry = PhaseRegistry::from_company(&phases, &roles()).unwrap();
        assert_eq!(registry.simple("Coding").unwrap().action(), PhaseAction::Coding);
        assert_eq!(
            registry.simple("Draft").unwrap().action(),
            PhaseAction::Output(OutputTarget::Codes)
        );
        assert_eq!(registry.simple_names(), vec!["Coding", "Draft"]);
    }

    #[test]
    fn test_unknown_role_fails() {
        let mut phases = BTreeMap::new();
        phases.insert("Coding".to_string(), entry("Programmer", "Designer", None));
        let err = PhaseRegistry::from_company(&phases, &roles()).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownRole { phase, role } if phase == "Coding" && role == "Designer")
        );
    }

    #[test]
    fn test_phase_without_action_fails() {
        let mut phases = BTreeMap::new();
        phases.insert(
            "Brainstorm".to_string(),
            entry("Programmer", "Chief Technology Officer", None),
        );
        assert!(matches!(
            PhaseRegistry::from_company(&phases, &roles()),
            Err(ConfigError::UnknownPhaseAction { .. })
        ));
    }

    #[test]
    fn test_lookup_failures_are_distinct() {
        let registry = PhaseRegistry::new();
        assert!(matches!(
            registry.simple("Nope"),
            Err(ConfigError::UnknownPhase { .. })
        ));
        assert!(matches!(
            registry.composed("Nope"),
            Err(ConfigError::UnknownComposedPhase { .. })
        ));
        assert!(registry.composed("CodeReview").is_ok());
    }

    #[test]
    fn test_register_custom_entries() {
        let mut registry = PhaseRegistry::new();
        registry.register_simple(SimplePhase::new(
            "Critique",
            RoleSpec::new("Reviewer", ""),
            RoleSpec::new("Programmer", ""),
            "",
            PhaseAction::Output(OutputTarget::ReviewComments),
        ));
        registry.register_composed(ComposedPolicy::new("Review"));
        assert!(registry.simple("Critique").is_ok());
        assert!(registry.composed_names().contains(&"Review"));
    }
}
