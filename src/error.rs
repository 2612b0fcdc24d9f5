//! Error types for frontier-forge operations.
//!
//! Defines the error taxonomy shared by every subsystem:
//! - Configuration (fatal, aborts construction)
//! - Tool plans (cycle and reference checks before execution)
//! - Attempt persistence
//! - LLM API interactions
//! - External collaborators and the coordinator loop
//!
//! Step-scoped tool failures live in [`crate::tools::ToolError`].

use thiserror::Error;

/// Errors raised while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that abort a tool plan before any step runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Circular dependency detected among steps: {0}")]
    CircularDependency(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Step '{0}' is defined more than once")]
    DuplicateStep(String),

    #[error("Invalid result binding in step '{step}': {reason}")]
    InvalidBinding { step: String, reason: String },
}

/// Errors that can occur while persisting attempt records.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The log lock could not be taken within the configured wait.
    #[error("Timed out after {waited_ms} ms waiting for lock '{path}'")]
    LockTimeout { path: String, waited_ms: u64 },
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned no content")]
    EmptyResponse,
}

/// Errors returned by external collaborators (generator, solver, verifier, ...).
///
/// The coordinator classifies these: `Interrupted` and `Fatal` propagate to the
/// caller, everything else ends the current attempt with a tagged outcome.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Interrupted")]
    Interrupted,

    #[error("Fatal collaborator failure: {0}")]
    Fatal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::InvalidData(err.to_string())
    }
}

/// Errors that stop the coordinator loop.
///
/// Everything recoverable is reported through
/// [`crate::attempt::AttemptOutcome`] instead.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Interrupted between attempts")]
    Interrupted,

    #[error("Fatal error during {stage}: {message}")]
    Fatal { stage: String, message: String },
}
