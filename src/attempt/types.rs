//! Attempt data model: tasks, tool calls, finalized records and outcomes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::coevolution::RateWindow;
use crate::curriculum::DifficultySignal;
use crate::tools::ToolStatus;

/// Version written into every attempt record.
pub const ATTEMPT_SCHEMA_VERSION: u32 = 1;

/// What the generator is asked to produce: the curriculum signal merged with
/// caller overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub domain: String,
    pub difficulty: f64,
    /// Extra generation parameters from the overrides.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl TaskRequest {
    pub fn from_signal(signal: &DifficultySignal) -> Self {
        Self {
            domain: signal.domain.clone(),
            difficulty: signal.difficulty,
            parameters: Map::new(),
        }
    }

    /// Merges caller overrides. `domain` and `difficulty` replace the signal's
    /// values; every other key becomes a generation parameter.
    ///
    /// # Errors
    ///
    /// Returns a description of the offending key when `domain` is not a
    /// string or `difficulty` is not a number.
    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Result<Self, String> {
        for (key, value) in overrides {
            match key.as_str() {
                "domain" => {
                    self.domain = value
                        .as_str()
                        .ok_or_else(|| format!("override 'domain' must be a string, got {}", value))?
                        .to_string();
                }
                "difficulty" => {
                    self.difficulty = value.as_f64().ok_or_else(|| {
                        format!("override 'difficulty' must be a number, got {}", value)
                    })?;
                }
                _ => {
                    self.parameters.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(self)
    }
}

/// A generated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub domain: String,
    pub difficulty: f64,
    pub prompt: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Optional hint for the verifier, e.g. an expected answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_spec: Option<Value>,
}

impl Task {
    pub fn new(domain: impl Into<String>, difficulty: f64, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            difficulty,
            prompt: prompt.into(),
            constraints: Vec::new(),
            verifier_spec: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_verifier_spec(mut self, spec: Value) -> Self {
        self.verifier_spec = Some(spec);
        self
    }
}

/// One tool invocation as stored on an attempt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: String,
    pub status: ToolStatus,
    pub output: Value,
}

/// External verdict on a solver's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pass,
    Fail,
    Unknown,
}

impl VerificationStatus {
    /// Only an explicit pass counts as success.
    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationStatus::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pass => "pass",
            VerificationStatus::Fail => "fail",
            VerificationStatus::Unknown => "unknown",
        }
    }
}

/// A finalized attempt, one line of the attempt log. Never mutated after it
/// is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub schema_version: u32,
    pub attempt_id: Uuid,
    pub task_id: String,
    pub domain: String,
    pub difficulty: f64,
    pub prompt: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub result: String,
    pub success: bool,
    pub verification_status: VerificationStatus,
    pub success_probability: f64,
    #[serde(default)]
    pub novelty_key: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
    pub reward_breakdown: BTreeMap<String, f64>,
    pub total_reward: f64,
    pub created_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Pipeline stage an attempt failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    Signal,
    Generate,
    Validate,
    Solve,
    Verify,
    SelfVerify,
    Estimate,
    Novelty,
    Persist,
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStage::Signal => "signal",
            AttemptStage::Generate => "generate",
            AttemptStage::Validate => "validate",
            AttemptStage::Solve => "solve",
            AttemptStage::Verify => "verify",
            AttemptStage::SelfVerify => "self_verify",
            AttemptStage::Estimate => "estimate",
            AttemptStage::Novelty => "novelty",
            AttemptStage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// Class of a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    InvalidData,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Io => "io",
            FailureKind::InvalidData => "invalid_data",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

/// Why an attempt produced no task this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    RateLimited { window: RateWindow, limit: u32 },
    TaskRejected { issues: Vec<String> },
}

/// Result of one coordinator cycle.
///
/// Only `Completed` is reported to the curriculum; skipped and failed cycles
/// leave it untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed(AttemptRecord),
    Skipped(SkipReason),
    Failed {
        stage: AttemptStage,
        kind: FailureKind,
        message: String,
    },
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Completed(record) if record.success => "success",
            AttemptOutcome::Completed(_) => "failure",
            AttemptOutcome::Skipped(SkipReason::RateLimited { .. }) => "rate_limited",
            AttemptOutcome::Skipped(SkipReason::TaskRejected { .. }) => "rejected",
            AttemptOutcome::Failed { .. } => "error",
        }
    }

    pub fn record(&self) -> Option<&AttemptRecord> {
        match self {
            AttemptOutcome::Completed(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AttemptOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal() -> DifficultySignal {
        DifficultySignal {
            domain: "math".to_string(),
            difficulty: 0.3,
        }
    }

    #[test]
    fn test_overrides_win() {
        let overrides = json!({"difficulty": 0.9, "style": "proof"});
        let request = TaskRequest::from_signal(&signal())
            .with_overrides(overrides.as_object().unwrap())
            .unwrap();
        assert_eq!(request.domain, "math");
        assert_eq!(request.difficulty, 0.9);
        assert_eq!(request.parameters.get("style"), Some(&json!("proof")));
        assert!(!request.parameters.contains_key("difficulty"));

        let overrides = json!({"domain": "logic"});
        let request = TaskRequest::from_signal(&signal())
            .with_overrides(overrides.as_object().unwrap())
            .unwrap();
        assert_eq!(request.domain, "logic");
        assert_eq!(request.difficulty, 0.3);
    }

    #[test]
    fn test_overrides_type_errors() {
        let overrides = json!({"difficulty": "hard"});
        let err = TaskRequest::from_signal(&signal())
            .with_overrides(overrides.as_object().unwrap())
            .unwrap_err();
        assert!(err.contains("difficulty"));
    }

    #[test]
    fn test_outcome_labels() {
        let skipped = AttemptOutcome::Skipped(SkipReason::RateLimited {
            window: RateWindow::Minute,
            limit: 30,
        });
        assert_eq!(skipped.label(), "rate_limited");
        assert!(!skipped.is_completed());
        assert!(skipped.record().is_none());

        let failed = AttemptOutcome::Failed {
            stage: AttemptStage::Solve,
            kind: FailureKind::Io,
            message: "disk".to_string(),
        };
        assert_eq!(failed.label(), "error");
        assert_eq!(AttemptStage::SelfVerify.to_string(), "self_verify");
    }

    #[test]
    fn test_verification_status_serde() {
        let status: VerificationStatus = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(status, VerificationStatus::Unknown);
        assert!(!status.is_pass());
        assert_eq!(serde_json::to_string(&VerificationStatus::Pass).unwrap(), "\"pass\"");
    }
}
