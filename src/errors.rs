//! Typed error hierarchy for the devchain orchestrator.
//!
//! Top-level enums follow the layers of a run:
//! - `ConfigError`: unresolvable configuration, fatal before any phase runs
//! - `EnvironmentError`: misuse of the shared project environment, fatal
//! - `DialogueError`: failures of the external dialogue/image backends
//! - `PhaseError`: per-phase execution failures
//! - `ChainError`: orchestrator-level failures wrapping all of the above

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be resolved into an executable chain.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Phase '{name}' is not registered (check PhaseConfig.json)")]
    UnknownPhase { name: String },

    #[error("Composed phase '{name}' is not registered")]
    UnknownComposedPhase { name: String },

    #[error("Phase '{phase}' has unknown phaseType '{phase_type}'")]
    UnknownPhaseType { phase: String, phase_type: String },

    #[error("Phase '{phase}' has no built-in action and no valid 'output' target")]
    UnknownPhaseAction { phase: String },

    #[error("Phase '{phase}' references role '{role}' missing from RoleConfig.json")]
    UnknownRole { phase: String, role: String },

    #[error("Composed phase '{phase}' is missing '{field}'")]
    MissingField { phase: String, field: &'static str },

    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Company config '{0}' not found")]
    CompanyNotFound(String),
}

/// The shared environment was used in a way the orchestrator never should.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Project directory already set to {current}; refusing to rebind to {requested}")]
    DirectoryAlreadySet { current: PathBuf, requested: PathBuf },

    #[error("Project directory has not been set")]
    DirectoryNotSet,
}

/// Failures of the external dialogue and image backends.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("Dialogue backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Dialogue backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Dialogue backend returned no choices")]
    EmptyResponse,

    #[error("Session was stepped before init")]
    NotInitialized,

    #[error("Scripted dialogue exhausted in session '{0}'")]
    ScriptExhausted(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Errors from a single phase execution.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase {phase}: no valid code files in the conclusion")]
    NoValidCodes { phase: String },

    #[error("Phase {phase}: dialogue failed: {source}")]
    Dialogue {
        phase: String,
        #[source]
        source: DialogueError,
    },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the chain orchestrator.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
