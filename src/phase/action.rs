//! What each phase does to the project environment.
//!
//! A [`PhaseAction`] has two halves. `prepare` runs before the dialogue and
//! may short-circuit it (nothing left to complete, or a missing module that
//! installing fixes). `apply` turns the conclusion of the dialogue into
//! environment updates.

use std::str::FromStr;
use tracing::{info, warn};

use super::PhaseServices;
use super::template::PromptValues;
use crate::dialogue::extract_conclusion;
use crate::env::{ProjectEnvironment, images};
use crate::errors::{ConfigError, PhaseError};
use crate::validator::{BuildValidator, fix_module_not_found_error};

/// Attempts per file before code completion gives up on it.
pub const MAX_COMPLETION_ATTEMPTS: u32 = 5;

const RUN_SUCCEEDED: &str = "The software run successfully without errors.";
const NOTHING_TO_DO: &str = "nothing need to do";
const DEFAULT_LANGUAGE: &str = "Python";
const GUI_HINT: &str = "The software should be equipped with a graphical user interface (GUI).";

/// Environment slot a configured phase writes its conclusion to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Codes,
    Requirements,
    Manuals,
    Modality,
    Ideas,
    Language,
    ReviewComments,
    ErrorSummary,
    TestReports,
}

impl FromStr for OutputTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "codes" => Ok(OutputTarget::Codes),
            "requirements" => Ok(OutputTarget::Requirements),
            "manuals" => Ok(OutputTarget::Manuals),
            "modality" => Ok(OutputTarget::Modality),
            "ideas" => Ok(OutputTarget::Ideas),
            "language" => Ok(OutputTarget::Language),
            "review_comments" => Ok(OutputTarget::ReviewComments),
            "error_summary" => Ok(OutputTarget::ErrorSummary),
            "test_reports" => Ok(OutputTarget::TestReports),
            other => Err(format!("unknown output target '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    DemandAnalysis,
    LanguageChoose,
    Coding,
    ArtDesign,
    ArtIntegration,
    CodeComplete,
    CodeReviewComment,
    CodeReviewModification,
    CodeReviewHuman,
    TestErrorSummary,
    TestModification,
    EnvironmentDoc,
    Manual,
    /// A configured phase writing its conclusion to one slot
    Output(OutputTarget),
}

/// Result of the pre-dialogue step.
#[derive(Debug, Clone, PartialEq)]
pub enum Preparation {
    /// Run the dialogue with these prompt values
    Dialogue(PromptValues),
    /// Skip the dialogue and apply this conclusion
    Concluded(String),
    /// Nothing to do for this phase
    Skip,
}

impl PhaseAction {
    /// Built-in action for a phase name.
    pub fn builtin(name: &str) -> Option<Self> {
        let action = match name {
            "DemandAnalysis" => PhaseAction::DemandAnalysis,
            "LanguageChoose" => PhaseAction::LanguageChoose,
            "Coding" => PhaseAction::Coding,
            "ArtDesign" => PhaseAction::ArtDesign,
            "ArtIntegration" => PhaseAction::ArtIntegration,
            "CodeComplete" => PhaseAction::CodeComplete,
            "CodeReviewComment" => PhaseAction::CodeReviewComment,
            "CodeReviewModification" => PhaseAction::CodeReviewModification,
            "CodeReviewHuman" => PhaseAction::CodeReviewHuman,
            "TestErrorSummary" => PhaseAction::TestErrorSummary,
            "TestModification" => PhaseAction::TestModification,
            "EnvironmentDoc" => PhaseAction::EnvironmentDoc,
            "Manual" => PhaseAction::Manual,
            _ => return None,
        };
        Some(action)
    }

    /// An explicit `output` wins over the built-in action for `name`.
    pub fn resolve(name: &str, output: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(output) = output {
            return output
                .parse::<OutputTarget>()
                .map(PhaseAction::Output)
                .map_err(|_| ConfigError::UnknownPhaseAction {
                    phase: name.to_string(),
                });
        }
        Self::builtin(name).ok_or_else(|| ConfigError::UnknownPhaseAction {
            phase: name.to_string(),
        })
    }

    /// Extra question appended when a conclusion has to be recovered by
    /// reflection.
    pub fn reflection_question(&self) -> &'static str {
        match self {
            PhaseAction::DemandAnalysis => {
                "Answer their final product modality in the discussion without any other words, e.g., \"PowerPoint\"."
            }
            PhaseAction::LanguageChoose => {
                "Conclude the programming language being discussed for software development, in the format: \"*\" where '*' represents a programming language."
            }
            _ => "Conclude the final decision of the discussion.",
        }
    }

    pub async fn prepare(
        &self,
        env: &mut ProjectEnvironment,
        services: &PhaseServices,
    ) -> Result<Preparation, PhaseError> {
        let mut values = PromptValues::new();
        match self {
            PhaseAction::CodeComplete => {
                let Some(file) = env
                    .codes
                    .unimplemented_file(&env.completion_attempts, MAX_COMPLETION_ATTEMPTS)
                else {
                    return Ok(Preparation::Skip);
                };
                *env.completion_attempts.entry(file.clone()).or_insert(0) += 1;
                values.insert("unimplemented_file", file);
            }
            PhaseAction::TestErrorSummary => {
                let validator = BuildValidator::new(env.directory()?, &services.validator);
                let report = validator.exist_bugs().await;
                env.exist_bugs = report.has_bug;
                env.scratch.test_reports = if report.has_bug {
                    report.message.clone()
                } else {
                    RUN_SUCCEEDED.to_string()
                };
                info!(has_bug = report.has_bug, "Test run finished");

                if report.message.contains("ModuleNotFoundError") {
                    let installed =
                        fix_module_not_found_error(&report.message, services.installer.as_ref())
                            .await;
                    info!(modules = ?installed, "Resolved ModuleNotFoundError by installing modules");
                    return Ok(Preparation::Concluded(NOTHING_TO_DO.to_string()));
                }
            }
            _ => {}
        }

        let mut all = prompt_values(env, services);
        all.append(&mut values);
        Ok(Preparation::Dialogue(all))
    }

    pub async fn apply(
        &self,
        phase: &str,
        env: &mut ProjectEnvironment,
        conclusion: &str,
        services: &PhaseServices,
    ) -> Result<(), PhaseError> {
        let git = env.config.git_management;
        match self {
            PhaseAction::DemandAnalysis => {
                if let Some(modality) = extract_conclusion(conclusion) {
                    env.scratch.modality = modality
                        .to_lowercase()
                        .trim_end_matches('.')
                        .trim()
                        .to_string();
                }
            }
            PhaseAction::LanguageChoose => {
                env.scratch.language = match extract_conclusion(conclusion) {
                    Some(language) if !language.is_empty() => language.to_string(),
                    _ if !conclusion.trim().is_empty() => conclusion.trim().to_string(),
                    _ => DEFAULT_LANGUAGE.to_string(),
                };
            }
            PhaseAction::Coding => {
                env.codes.update(conclusion);
                if env.codes.is_empty() {
                    return Err(PhaseError::NoValidCodes {
                        phase: phase.to_string(),
                    });
                }
                env.codes.rewrite(git)?;
            }
            PhaseAction::ArtDesign => {
                env.proposed_images = images::extract_proposed_images(conclusion);
                let directory = env.directory()?.to_path_buf();
                images::generate_missing(
                    &directory,
                    &env.proposed_images,
                    services.images.as_ref(),
                    &services.image_size,
                )
                .await?;
            }
            PhaseAction::ArtIntegration => {
                env.codes.update(conclusion);
                env.codes.rewrite(git)?;
                env.incorporated_images = images::referenced_images(&env.codes.joined());
                let directory = env.directory()?.to_path_buf();
                images::generate_missing(
                    &directory,
                    &env.incorporated_images,
                    services.images.as_ref(),
                    &services.image_size,
                )
                .await?;
            }
            PhaseAction::CodeComplete => {
                env.codes.update(conclusion);
                env.codes.rewrite(git)?;
            }
            PhaseAction::CodeReviewComment => {
                env.scratch.review_comments = conclusion.to_string();
            }
            PhaseAction::CodeReviewModification
            | PhaseAction::CodeReviewHuman
            | PhaseAction::TestModification => {
                if conclusion.contains("```") {
                    env.codes.update(conclusion);
                    env.codes.rewrite(git)?;
                }
            }
            PhaseAction::TestErrorSummary => {
                env.scratch.error_summary = conclusion.to_string();
            }
            PhaseAction::EnvironmentDoc => {
                env.requirements.update(conclusion);
                env.requirements.rewrite()?;
            }
            PhaseAction::Manual => {
                env.manuals.update(conclusion);
                env.manuals.rewrite()?;
            }
            PhaseAction::Output(target) => apply_output(*target, env, conclusion)?,
        }
        Ok(())
    }
}

fn apply_output(
    target: OutputTarget,
    env: &mut ProjectEnvironment,
    conclusion: &str,
) -> Result<(), PhaseError> {
    let text = extract_conclusion(conclusion)
        .unwrap_or(conclusion.trim())
        .to_string();
    match target {
        OutputTarget::Codes => {
            if env.codes.update(conclusion) > 0 {
                env.codes.rewrite(env.config.git_management)?;
            } else {
                warn!("Conclusion carried no code changes");
            }
        }
        OutputTarget::Requirements => {
            env.requirements.update(conclusion);
            env.requirements.rewrite()?;
        }
        OutputTarget::Manuals => {
            env.manuals.update(conclusion);
            env.manuals.rewrite()?;
        }
        OutputTarget::Modality => env.scratch.modality = text,
        OutputTarget::Ideas => env.scratch.ideas = text,
        OutputTarget::Language => env.scratch.language = text,
        OutputTarget::ReviewComments => env.scratch.review_comments = conclusion.to_string(),
        OutputTarget::ErrorSummary => env.scratch.error_summary = conclusion.to_string(),
        OutputTarget::TestReports => env.scratch.test_reports = conclusion.to_string(),
    }
    Ok(())
}

/// Placeholder values every phase prompt may reference.
pub fn prompt_values(env: &ProjectEnvironment, services: &PhaseServices) -> PromptValues {
    let scratch = &env.scratch;
    let mut values = PromptValues::new();
    values.insert("task", scratch.task_prompt.clone());
    values.insert("description", scratch.task_prompt.clone());
    values.insert("modality", scratch.modality.clone());
    values.insert("ideas", scratch.ideas.clone());
    values.insert("language", scratch.language.clone());
    values.insert("comments", scratch.review_comments.clone());
    values.insert("error_summary", scratch.error_summary.clone());
    values.insert("test_reports", scratch.test_reports.clone());
    values.insert("codes", env.codes.joined());
    values.insert("requirements", env.requirements.joined());
    values.insert("manuals", env.manuals.joined());
    values.insert("images", env.images_summary());
    values.insert(
        "gui",
        if env.config.gui_design {
            GUI_HINT.to_string()
        } else {
            String::new()
        },
    );
    values.insert("unimplemented_file", String::new());
    values.insert("background_prompt", services.background_prompt.clone());
    values
}
