//! Interfaces to the external collaborators of the loop.
//!
//! Each collaborator returns [`CollaboratorError`]; the coordinator decides
//! whether an error ends the attempt or propagates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attempt::{Task, TaskRequest, ToolCallRecord, VerificationStatus};
use crate::error::CollaboratorError;

/// Produces a task for a curriculum request.
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    async fn generate(&self, request: &TaskRequest) -> Result<Task, CollaboratorError>;
}

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            check_name: name.into(),
            passed: true,
            message: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check_name: name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Outcome of validating a generated task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskValidation {
    pub checks: Vec<CheckResult>,
}

impl TaskValidation {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        Self { checks }
    }

    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// One line per failed check.
    pub fn issues(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match &c.message {
                Some(message) => format!("{}: {}", c.check_name, message),
                None => c.check_name.clone(),
            })
            .collect()
    }
}

/// Decides whether a generated task may be attempted.
#[async_trait]
pub trait TaskValidator: Send + Sync {
    async fn validate(
        &self,
        request: &TaskRequest,
        task: &Task,
    ) -> Result<TaskValidation, CollaboratorError>;
}

/// Structural checks on a generated task.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTaskValidator;

#[async_trait]
impl TaskValidator for BasicTaskValidator {
    async fn validate(
        &self,
        request: &TaskRequest,
        task: &Task,
    ) -> Result<TaskValidation, CollaboratorError> {
        let mut checks = Vec::with_capacity(4);

        checks.push(if task.id.trim().is_empty() {
            CheckResult::fail("task_id", "task id is empty")
        } else {
            CheckResult::pass("task_id")
        });

        checks.push(if task.prompt.trim().is_empty() {
            CheckResult::fail("prompt", "prompt is empty")
        } else {
            CheckResult::pass("prompt")
        });

        checks.push(if task.domain == request.domain {
            CheckResult::pass("domain")
        } else {
            CheckResult::fail(
                "domain",
                format!("expected '{}', got '{}'", request.domain, task.domain),
            )
        });

        checks.push(if (0.0..=1.0).contains(&task.difficulty) {
            CheckResult::pass("difficulty")
        } else {
            CheckResult::fail(
                "difficulty",
                format!("{} is outside [0, 1]", task.difficulty),
            )
        });

        Ok(TaskValidation::new(checks))
    }
}

/// What a solver produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolveOutput {
    pub tool_calls: Vec<ToolCallRecord>,
    pub result: String,
    /// Transcript of the solving conversation, if any.
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Attempts a task, possibly through tool plans.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, task: &Task) -> Result<SolveOutput, CollaboratorError>;
}

/// A verifier's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    #[serde(default)]
    pub detail: String,
}

/// Checks a solver's result against the task.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, task: &Task, result: &str) -> Result<Verification, CollaboratorError>;
}

/// Estimates how likely the solver is to succeed on a prompt.
#[async_trait]
pub trait UncertaintyEstimator: Send + Sync {
    /// Probability in [0, 1]. Out-of-range values are clamped by the reward.
    async fn estimate(&self, prompt: &str, answer: &str) -> Result<f64, CollaboratorError>;
}

/// Independent second opinion on a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    /// Whether the judges agree the result is correct.
    pub agreed: bool,
    /// Fraction of judges in favour, in [0, 1].
    pub confidence: f64,
}

/// Self-verification that can veto a pass.
#[async_trait]
pub trait ConsensusChecker: Send + Sync {
    async fn check(&self, task: &Task, result: &str) -> Result<Consensus, CollaboratorError>;
}
