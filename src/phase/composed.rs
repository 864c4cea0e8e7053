use tracing::info;

use super::action::MAX_COMPLETION_ATTEMPTS;
use super::{PhaseInvocation, PhaseReport, PhaseServices};
use crate::env::ProjectEnvironment;
use crate::errors::PhaseError;

/// Early exit for a composed phase, checked after every inner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakCondition {
    /// Always run every cycle
    #[default]
    Never,
    /// Review comments contain `<INFO> Finished`
    ReviewFinished,
    /// The last test run found no bugs
    NoBugs,
    /// No file is left with an unimplemented body
    AllImplemented,
}

impl BreakCondition {
    pub fn is_met(&self, env: &ProjectEnvironment) -> bool {
        match self {
            BreakCondition::Never => false,
            BreakCondition::ReviewFinished => env
                .scratch
                .review_comments
                .to_lowercase()
                .contains("<info> finished"),
            BreakCondition::NoBugs => !env.exist_bugs,
            BreakCondition::AllImplemented => env
                .codes
                .unimplemented_file(&env.completion_attempts, MAX_COMPLETION_ATTEMPTS)
                .is_none(),
        }
    }
}

/// Registered behavior of a composed phase name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPolicy {
    pub name: String,
    pub break_condition: BreakCondition,
}

impl ComposedPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            break_condition: BreakCondition::Never,
        }
    }

    pub fn with_break_condition(mut self, condition: BreakCondition) -> Self {
        self.break_condition = condition;
        self
    }

    pub fn builtins() -> Vec<Self> {
        vec![
            Self::new("CodeCompleteAll").with_break_condition(BreakCondition::AllImplemented),
            Self::new("CodeReview").with_break_condition(BreakCondition::ReviewFinished),
            Self::new("Test").with_break_condition(BreakCondition::NoBugs),
            Self::new("HumanAgentInteraction"),
            Self::new("Art"),
        ]
    }
}

/// A composed phase bound to its cycle count and composition.
#[derive(Debug, Clone)]
pub struct ComposedPhase {
    name: String,
    cycle_count: u32,
    composition: Vec<PhaseInvocation>,
    break_condition: BreakCondition,
}

impl ComposedPhase {
    pub fn new(policy: &ComposedPolicy, cycle_count: u32, composition: Vec<PhaseInvocation>) -> Self {
        Self {
            name: policy.name.clone(),
            cycle_count,
            composition,
            break_condition: policy.break_condition,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn composition(&self) -> &[PhaseInvocation] {
        &self.composition
    }

    /// Run the composition `cycle_count` times, in order. Nested composed
    /// phases run their own cycles in place. The first inner failure aborts
    /// the whole composed phase; a met break condition ends it right after
    /// the invocation that satisfied it.
    pub async fn execute(
        &self,
        env: &mut ProjectEnvironment,
        services: &PhaseServices,
    ) -> Result<Vec<PhaseReport>, PhaseError> {
        let mut reports = Vec::with_capacity(self.cycle_count as usize * self.composition.len());
        for cycle in 1..=self.cycle_count {
            info!(phase = %self.name, cycle, of = self.cycle_count, "Composed phase cycle");
            for invocation in &self.composition {
                reports.extend(invocation.execute(env, services).await?);
                if self.break_condition.is_met(env) {
                    info!(
                        phase = %self.name,
                        cycle,
                        after = invocation.name(),
                        condition = ?self.break_condition,
                        "Break condition met"
                    );
                    return Ok(reports);
                }
            }
        }
        Ok(reports)
    }
}
