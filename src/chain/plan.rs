//! Compile the configured step list into a typed plan before anything runs.

use std::fmt;

use crate::chain::config::ChainStep;
use crate::errors::ConfigError;
use crate::phase::{ComposedPhase, PhaseInvocation, PhaseRegistry, SimpleInvocation};

const SIMPLE_PHASE: &str = "SimplePhase";
const COMPOSED_PHASE: &str = "ComposedPhase";

/// A fully resolved chain.
#[derive(Debug, Clone, Default)]
pub struct ChainPlan {
    steps: Vec<PhaseInvocation>,
}

impl ChainPlan {
    /// Resolve every step against `registry`, descending into nested
    /// compositions. Fails on the first step that names an unknown phase,
    /// composed phase or phase type.
    pub fn compile(steps: &[ChainStep], registry: &PhaseRegistry) -> Result<Self, ConfigError> {
        let steps = steps
            .iter()
            .map(|step| compile_step(step, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PhaseInvocation] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for ChainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "{:>2}. ", i + 1)?;
            render(f, step, 0)?;
        }
        Ok(())
    }
}

fn render(f: &mut fmt::Formatter<'_>, step: &PhaseInvocation, depth: usize) -> fmt::Result {
    match step {
        PhaseInvocation::Simple(simple) => writeln!(
            f,
            "{} (turns: {}, reflect: {})",
            simple.name(),
            simple.max_turns,
            simple.need_reflect
        ),
        PhaseInvocation::Composed(composed) => {
            writeln!(f, "{} x{}", composed.name(), composed.cycle_count())?;
            for inner in composed.composition() {
                write!(f, "{:width$}- ", "", width = 6 + depth * 2)?;
                render(f, inner, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn compile_step(step: &ChainStep, registry: &PhaseRegistry) -> Result<PhaseInvocation, ConfigError> {
    match step.phase_type.as_str() {
        SIMPLE_PHASE => compile_simple(step, registry).map(PhaseInvocation::Simple),
        COMPOSED_PHASE => {
            let policy = registry.composed(&step.phase)?;
            let cycles = step.cycle_num.ok_or_else(|| ConfigError::MissingField {
                phase: step.phase.clone(),
                field: "cycleNum",
            })?;
            let composition = step
                .composition
                .as_ref()
                .ok_or_else(|| ConfigError::MissingField {
                    phase: step.phase.clone(),
                    field: "Composition",
                })?
                .iter()
                .map(|inner| compile_step(inner, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PhaseInvocation::Composed(ComposedPhase::new(
                policy,
                cycles,
                composition,
            )))
        }
        other => Err(ConfigError::UnknownPhaseType {
            phase: step.phase.clone(),
            phase_type: other.to_string(),
        }),
    }
}

fn compile_simple(step: &ChainStep, registry: &PhaseRegistry) -> Result<SimpleInvocation, ConfigError> {
    let phase = registry.simple(&step.phase)?;
    Ok(SimpleInvocation::new(
        phase,
        step.max_turn_step,
        step.need_reflect,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::ScriptedSessionFactory;
    use crate::env::{EnvConfig, ProjectEnvironment};
    use crate::phase::{
        ComposedPolicy, OutputTarget, PhaseAction, PhaseServices, RoleSpec, SimplePhase,
    };
    use std::sync::Arc;

    fn registry() -> PhaseRegistry {
        let mut registry = PhaseRegistry::new();
        for (name, target) in [
            ("Draft", OutputTarget::Codes),
            ("Critique", OutputTarget::ReviewComments),
            ("Revise", OutputTarget::Codes),
        ] {
            registry.register_simple(SimplePhase::new(
                name,
                RoleSpec::new("Programmer", ""),
                RoleSpec::new("Reviewer", ""),
                "{task}",
                PhaseAction::Output(target),
            ));
        }
        registry.register_composed(ComposedPolicy::new("Review"));
        registry.register_composed(ComposedPolicy::new("Outer"));
        registry
    }

    fn review(cycles: u32) -> ChainStep {
        ChainStep::composed(
            "Review",
            cycles,
            vec![
                ChainStep::simple("Critique", 1, false),
                ChainStep::simple("Revise", 1, false),
            ],
        )
    }

    #[test]
    fn test_compile_resolves_steps() {
        let plan =
            ChainPlan::compile(&[ChainStep::simple("Draft", 3, false), review(2)], &registry())
                .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].name(), "Draft");
        match &plan.steps()[1] {
            PhaseInvocation::Composed(composed) => {
                assert_eq!(composed.cycle_count(), 2);
                assert_eq!(composed.composition().len(), 2);
            }
            other => panic!("expected composed step, got {:?}", other.name()),
        }
        let rendered = plan.to_string();
        assert!(rendered.contains("Draft (turns: 3"));
        assert!(rendered.contains("Review x2"));
    }

    #[test]
    fn test_compile_unknown_phase() {
        let err = ChainPlan::compile(
            &[ChainStep::simple("Draft", 1, false), ChainStep::simple("Nope", 1, false)],
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPhase { name } if name == "Nope"));
    }

    #[test]
    fn test_compile_unknown_composed_phase() {
        let mut step = review(1);
        step.phase = "Mystery".into();
        assert!(matches!(
            ChainPlan::compile(&[step], &registry()),
            Err(ConfigError::UnknownComposedPhase { .. })
        ));
    }

    #[test]
    fn test_compile_unknown_phase_type() {
        let mut step = ChainStep::simple("Draft", 1, false);
        step.phase_type = "LoopPhase".into();
        let err = ChainPlan::compile(&[step], &registry()).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownPhaseType { phase, phase_type } if phase == "Draft" && phase_type == "LoopPhase")
        );
    }

    #[test]
    fn test_compile_rejects_incomplete_composed() {
        let mut missing = review(1);
        missing.cycle_num = None;
        assert!(matches!(
            ChainPlan::compile(&[missing], &registry()),
            Err(ConfigError::MissingField { field: "cycleNum", .. })
        ));

        let mut missing = review(1);
        missing.composition = None;
        assert!(matches!(
            ChainPlan::compile(&[missing], &registry()),
            Err(ConfigError::MissingField { field: "Composition", .. })
        ));
    }

    #[test]
    fn test_compile_nested_composed() {
        let outer = ChainStep::composed("Outer", 2, vec![review(2)]);
        let plan = ChainPlan::compile(&[outer], &registry()).unwrap();
        let PhaseInvocation::Composed(outer) = &plan.steps()[0] else {
            panic!("expected composed step");
        };
        assert_eq!(outer.cycle_count(), 2);
        let PhaseInvocation::Composed(inner) = &outer.composition()[0] else {
            panic!("expected nested composed step");
        };
        assert_eq!(inner.name(), "Review");
        assert_eq!(inner.cycle_count(), 2);
        assert_eq!(inner.composition().len(), 2);

        let rendered = plan.to_string();
        assert!(rendered.contains("Outer x2"));
        assert!(rendered.contains("- Review x2"));
        assert!(rendered.contains("- Critique (turns: 1"));
    }

    #[test]
    fn test_compile_nested_unknown_phase() {
        let mut inner = review(1);
        inner.composition = Some(vec![ChainStep::simple("Ghost", 1, false)]);
        let outer = ChainStep::composed("Outer", 1, vec![inner]);
        let err = ChainPlan::compile(&[outer], &registry()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPhase { name } if name == "Ghost"));
    }

    #[tokio::test]
    async fn test_execute_plan_in_order() {
        let factory = ScriptedSessionFactory::new();
        factory.push_reply("Draft", "main.py\n```python\nprint(1)\n```\n");
        for _ in 0..2 {
            factory.push_reply("Critique", "Looks fine");
            factory.push_reply("Revise", "main.py\n```python\nprint(2)\n```\n");
        }
        let services = PhaseServices::new(Arc::new(factory.clone()));
        let plan =
            ChainPlan::compile(&[ChainStep::simple("Draft", 1, false), review(2)], &registry())
                .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut env = ProjectEnvironment::new(EnvConfig::default(), "main.py");
        env.set_directory(dir.path().to_path_buf()).unwrap();
        let mut reports = Vec::new();
        for step in plan.steps() {
            reports.extend(step.execute(&mut env, &services).await.unwrap());
        }

        assert_eq!(reports.len(), 5);
        assert_eq!(
            factory.opened(),
            vec!["Draft", "Critique", "Revise", "Critique", "Revise"]
        );
    }

    #[tokio::test]
    async fn test_execute_nested_plan_inner_by_outer() {
        let factory = ScriptedSessionFactory::with_default_reply("ok");
        let services = PhaseServices::new(Arc::new(factory.clone()));
        let plan = ChainPlan::compile(
            &[ChainStep::composed("Outer", 2, vec![review(2)])],
            &registry(),
        )
        .unwrap();

        let mut env = ProjectEnvironment::new(EnvConfig::default(), "main.py");
        let reports = plan.steps()[0].execute(&mut env, &services).await.unwrap();

        assert_eq!(reports.len(), 8);
        assert_eq!(factory.opened(), ["Critique", "Revise"].repeat(4));
    }
}
