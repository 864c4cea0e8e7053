//! One bounded conversation between two fixed roles.
//!
//! ```text
//! NotStarted ──> Running ──────────────────────> Completed
//!                   │                                ^
//!                   └──> ReflectionPending ──────────┘
//! ```

use serde::Serialize;
use tracing::{debug, info};

use super::PhaseServices;
use super::action::{PhaseAction, Preparation};
use super::template::{PromptValues, fill};
use crate::dialogue::{ChatResponse, INFO_MARKER, SystemPrompts};
use crate::env::ProjectEnvironment;
use crate::errors::{DialogueError, PhaseError};

/// Session label used for reflection sessions.
pub const REFLECTION_LABEL: &str = "Reflection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseState {
    NotStarted,
    Running,
    ReflectionPending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    /// Dialogue turns actually taken
    pub turns: usize,
    pub reflected: bool,
    pub state: PhaseState,
}

/// Role names and prompts for one side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub prompt: String,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplePhase {
    name: String,
    assistant: RoleSpec,
    user: RoleSpec,
    phase_prompt: String,
    action: PhaseAction,
    /// Assistant and user of the reflection session
    reflection: (RoleSpec, RoleSpec),
}

impl SimplePhase {
    pub fn new(
        name: impl Into<String>,
        assistant: RoleSpec,
        user: RoleSpec,
        phase_prompt: impl Into<String>,
        action: PhaseAction,
    ) -> Self {
        Self {
            name: name.into(),
            assistant,
            user,
            phase_prompt: phase_prompt.into(),
            action,
            reflection: (
                RoleSpec::new("Chief Executive Officer", "You are Chief Executive Officer."),
                RoleSpec::new("Counselor", "You are Counselor."),
            ),
        }
    }

    /// Override the roles used for reflection.
    pub fn with_reflection_roles(mut self, assistant: RoleSpec, user: RoleSpec) -> Self {
        self.reflection = (assistant, user);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> PhaseAction {
        self.action
    }

    /// Run the phase against `env`.
    ///
    /// All work happens on a copy of the environment which replaces `env` only
    /// when every step succeeded.
    pub async fn execute(
        &self,
        env: &mut ProjectEnvironment,
        services: &PhaseServices,
        max_turns: usize,
        need_reflect: bool,
    ) -> Result<PhaseReport, PhaseError> {
        let mut report = PhaseReport {
            phase: self.name.clone(),
            turns: 0,
            reflected: false,
            state: PhaseState::NotStarted,
        };
        let mut working = env.clone();

        let conclusion = match self.action.prepare(&mut working, services).await? {
            Preparation::Skip => {
                debug!(phase = %self.name, "Nothing to do, skipping dialogue");
                report.state = PhaseState::Completed;
                *env = working;
                return Ok(report);
            }
            Preparation::Concluded(conclusion) => conclusion,
            Preparation::Dialogue(mut values) => {
                report.state = PhaseState::Running;
                values.insert("assistant_role", self.assistant.name.clone());
                values.insert("user_role", self.user.name.clone());
                self.converse(&values, services, max_turns, need_reflect, &mut report)
                    .await?
            }
        };

        self.action
            .apply(&self.name, &mut working, &conclusion, services)
            .await?;

        *env = working;
        report.state = PhaseState::Completed;
        info!(
            phase = %self.name,
            turns = report.turns,
            reflected = report.reflected,
            "Phase completed"
        );
        Ok(report)
    }

    async fn converse(
        &self,
        values: &PromptValues,
        services: &PhaseServices,
        max_turns: usize,
        need_reflect: bool,
        report: &mut PhaseReport,
    ) -> Result<String, PhaseError> {
        let prompts = SystemPrompts {
            assistant_role_name: self.assistant.name.clone(),
            assistant_prompt: fill(&self.assistant.prompt, values),
            user_role_name: self.user.name.clone(),
            user_prompt: fill(&self.user.prompt, values),
        };
        let seed = fill(&self.phase_prompt, values);

        let mut session = services.sessions.open(&self.name);
        let mut message = session
            .init(&prompts, &seed)
            .await
            .map_err(|e| self.dialogue_error(e))?;

        let mut transcript: Vec<ChatResponse> = Vec::new();
        let mut conclusion = String::new();
        for _ in 0..max_turns {
            let (assistant, user) = session
                .step(&message, max_turns == 1)
                .await
                .map_err(|e| self.dialogue_error(e))?;
            report.turns += 1;

            conclusion = assistant.content.clone();
            let done = assistant.terminated || user.terminated || assistant.has_conclusion();
            transcript.push(assistant);
            if done {
                break;
            }
            transcript.push(user.clone());
            message = user.into_message();
        }
        debug!(phase = %self.name, turns = report.turns, "Dialogue finished");

        if need_reflect && !conclusion.contains(INFO_MARKER) {
            report.state = PhaseState::ReflectionPending;
            conclusion = self.reflect(&transcript, values, services).await?;
            report.reflected = true;
        }
        Ok(conclusion)
    }

    /// Ask a separate pair of roles to extract the conclusion from the
    /// transcript.
    async fn reflect(
        &self,
        transcript: &[ChatResponse],
        values: &PromptValues,
        services: &PhaseServices,
    ) -> Result<String, PhaseError> {
        let (assistant, user) = &self.reflection;
        let conversation = transcript
            .iter()
            .map(|r| format!("{}: {}", r.role_name, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let seed = format!(
            "Here is a conversation between two roles: {} {}",
            conversation,
            self.action.reflection_question()
        );
        let prompts = SystemPrompts {
            assistant_role_name: assistant.name.clone(),
            assistant_prompt: fill(&assistant.prompt, values),
            user_role_name: user.name.clone(),
            user_prompt: fill(&user.prompt, values),
        };

        let mut session = services.sessions.open(REFLECTION_LABEL);
        let message = session
            .init(&prompts, &seed)
            .await
            .map_err(|e| self.dialogue_error(e))?;
        let (answer, _) = session
            .step(&message, true)
            .await
            .map_err(|e| self.dialogue_error(e))?;

        info!(phase = %self.name, "Conclusion recovered by reflection");
        if answer.has_conclusion() {
            Ok(answer.content)
        } else {
            Ok(format!("{} {}", INFO_MARKER, answer.content))
        }
    }

    fn dialogue_error(&self, source: DialogueError) -> PhaseError {
        PhaseError::Dialogue {
            phase: self.name.clone(),
            source,
        }
    }
}
