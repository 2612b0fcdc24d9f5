//! Judge-model verifier.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ask_json, AgentConfig};
use crate::attempt::{Task, VerificationStatus};
use crate::coevolution::{Verification, Verifier};
use crate::error::CollaboratorError;
use crate::llm::LlmProvider;

const VERIFIER_SYSTEM_PROMPT: &str = r#"You are a strict grader. Decide whether a submitted answer correctly solves the task.

- "pass": the answer is correct and satisfies every constraint.
- "fail": the answer is wrong, incomplete, or violates a constraint.
- "unknown": correctness cannot be decided from the information given.

Judge only the final answer, not the style.

You MUST respond with ONLY a valid JSON object in this exact format:
{
  "status": "pass" | "fail" | "unknown",
  "detail": "<one or two sentences explaining the verdict>"
}"#;

const VERIFIER_USER_TEMPLATE: &str = r#"Task:
{prompt}

Constraints:
{constraints}

Reference: {reference}

Submitted answer:
{result}"#;

/// Grades results with a judge model.
///
/// When the task carries an `expected_answer` that the result matches
/// exactly (ignoring surrounding whitespace), the verdict is `pass` without
/// calling the model.
pub struct LlmVerifier {
    llm: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl std::fmt::Debug for LlmVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmVerifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn expected_answer(task: &Task) -> Option<&str> {
    task.verifier_spec
        .as_ref()?
        .get("expected_answer")?
        .as_str()
}

impl LlmVerifier {
    pub const AGENT_NAME: &'static str = "verifier";

    pub fn new(llm: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { llm, config }
    }

    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, AgentConfig::default().with_temperature(0.0))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn format_prompt(task: &Task, result: &str) -> String {
        let constraints = if task.constraints.is_empty() {
            "(none)".to_string()
        } else {
            task.constraints
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let reference = match (&task.verifier_spec, expected_answer(task)) {
            (_, Some(answer)) => format!("expected answer is {}", answer),
            (Some(spec), None) => spec.to_string(),
            (None, None) => "(none)".to_string(),
        };
        VERIFIER_USER_TEMPLATE
            .replace("{prompt}", &task.prompt)
            .replace("{constraints}", &constraints)
            .replace("{reference}", &reference)
            .replace("{result}", result)
    }
}

#[async_trait]
impl Verifier for LlmVerifier {
    async fn verify(&self, task: &Task, result: &str) -> Result<Verification, CollaboratorError> {
        if let Some(answer) = expected_answer(task) {
            if answer.trim() == result.trim() {
                return Ok(Verification {
                    status: VerificationStatus::Pass,
                    detail: "matches expected answer".to_string(),
                });
            }
        }

        let verification: Verification = ask_json(
            self.llm.as_ref(),
            &self.config,
            Self::AGENT_NAME,
            VERIFIER_SYSTEM_PROMPT,
            &Self::format_prompt(task, result),
        )
        .await?;

        tracing::debug!(
            task_id = %task.id,
            status = verification.status.as_str(),
            "Judge verdict"
        );
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::MockLlmProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_judge_verdicts() {
        for (response, expected) in [
            (r#"{"status": "pass", "detail": "correct"}"#, VerificationStatus::Pass),
            (r#"{"status": "fail"}"#, VerificationStatus::Fail),
            (r#"{"status": "unknown", "detail": "ambiguous"}"#, VerificationStatus::Unknown),
        ] {
            let verifier = LlmVerifier::with_defaults(Arc::new(MockLlmProvider::new(response)));
            let verification = verifier
                .verify(&Task::new("logic", 0.4, "Is it raining?"), "yes")
                .await
                .unwrap();
            assert_eq!(verification.status, expected);
        }
    }

    #[tokio::test]
    async fn test_exact_expected_answer_skips_judge() {
        let llm = Arc::new(MockLlmProvider::new(r#"{"status": "fail"}"#));
        let verifier = LlmVerifier::with_defaults(llm.clone());
        let task = Task::new("math", 0.2, "6 * 7?")
            .with_verifier_spec(json!({"expected_answer": "42"}));

        let verification = verifier.verify(&task, " 42\n").await.unwrap();
        assert_eq!(verification.status, VerificationStatus::Pass);
        assert!(llm.requests().is_empty());

        let verification = verifier.verify(&task, "forty-two").await.unwrap();
        assert_eq!(verification.status, VerificationStatus::Fail);
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[1].content.contains("expected answer is 42"));
        assert_eq!(requests[0].temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_invalid_status_is_an_error() {
        let llm = Arc::new(MockLlmProvider::new(r#"{"status": "maybe"}"#));
        let verifier =
            LlmVerifier::new(llm, AgentConfig::default().with_parse_attempts(1));
        let err = verifier
            .verify(&Task::new("logic", 0.4, "p"), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Llm(_)));
    }
}
