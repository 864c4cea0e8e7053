//! Phase engine: simple phases, composed cycles and the registry that
//! resolves configured names to them.

pub mod action;
pub mod composed;
pub mod registry;
pub mod simple;
pub mod template;

pub use action::{OutputTarget, PhaseAction};
pub use composed::{BreakCondition, ComposedPhase, ComposedPolicy};
pub use registry::PhaseRegistry;
pub use simple::{PhaseReport, PhaseState, RoleSpec, SimplePhase};

use std::sync::Arc;

use crate::devchain_config::ValidatorSection;
use crate::dialogue::{ImageGenerator, NoopImageGenerator, SessionFactory};
use crate::env::ProjectEnvironment;
use crate::errors::PhaseError;
use crate::validator::{DependencyInstaller, PipInstaller};

/// Turn limit used when a step configures zero or fewer turns.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// External collaborators phases call into.
#[derive(Clone)]
pub struct PhaseServices {
    pub sessions: Arc<dyn SessionFactory>,
    pub images: Arc<dyn ImageGenerator>,
    pub installer: Arc<dyn DependencyInstaller>,
    pub validator: ValidatorSection,
    pub image_size: String,
    pub background_prompt: String,
}

impl PhaseServices {
    /// Services with no image generation, `pip` as installer and the default
    /// validator settings.
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        let validator = ValidatorSection::default();
        Self {
            sessions,
            images: Arc::new(NoopImageGenerator),
            installer: Arc::new(PipInstaller::new(validator.install_program.clone())),
            validator,
            image_size: "256x256".to_string(),
            background_prompt: String::new(),
        }
    }

    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>, size: &str) -> Self {
        self.images = images;
        self.image_size = size.to_string();
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorSection) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_background_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.background_prompt = prompt.into();
        self
    }
}

/// A simple phase bound to its per-step settings.
#[derive(Debug, Clone)]
pub struct SimpleInvocation {
    pub phase: Arc<SimplePhase>,
    pub max_turns: usize,
    pub need_reflect: bool,
}

impl SimpleInvocation {
    /// `max_turn_step <= 0` selects [`DEFAULT_MAX_TURNS`].
    pub fn new(phase: Arc<SimplePhase>, max_turn_step: i64, need_reflect: bool) -> Self {
        let max_turns = usize::try_from(max_turn_step)
            .ok()
            .filter(|turns| *turns > 0)
            .unwrap_or(DEFAULT_MAX_TURNS);
        Self {
            phase,
            max_turns,
            need_reflect,
        }
    }

    pub fn name(&self) -> &str {
        self.phase.name()
    }

    pub async fn execute(
        &self,
        env: &mut ProjectEnvironment,
        services: &PhaseServices,
    ) -> Result<PhaseReport, PhaseError> {
        self.phase
            .execute(env, services, self.max_turns, self.need_reflect)
            .await
    }
}

/// One resolved step: a simple phase, or a composed phase running its own
/// cycles. Composed phases may nest.
#[derive(Debug, Clone)]
pub enum PhaseInvocation {
    Simple(SimpleInvocation),
    Composed(ComposedPhase),
}

impl PhaseInvocation {
    pub fn name(&self) -> &str {
        match self {
            PhaseInvocation::Simple(simple) => simple.name(),
            PhaseInvocation::Composed(composed) => composed.name(),
        }
    }

    pub async fn execute(
        &self,
        env: &mut ProjectEnvironment,
        services: &PhaseServices,
    ) -> Result<Vec<PhaseReport>, PhaseError> {
        match self {
            PhaseInvocation::Simple(simple) => Ok(vec![simple.execute(env, services).await?]),
            PhaseInvocation::Composed(composed) => Box::pin(composed.execute(env, services)).await,
        }
    }
}
