//! Success-probability estimation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ask_json, AgentConfig};
use crate::coevolution::UncertaintyEstimator;
use crate::error::CollaboratorError;
use crate::llm::LlmProvider;

const ESTIMATOR_SYSTEM_PROMPT: &str = r#"You estimate how likely an answer is to be correct.

Read the task and the proposed answer. Without solving the task again from scratch, give the probability (0.0 to 1.0) that the answer is correct. Use values near 0.5 when you are genuinely unsure.

You MUST respond with ONLY a valid JSON object in this exact format:
{
  "probability": <float between 0.0 and 1.0>
}"#;

const ESTIMATOR_USER_TEMPLATE: &str = r#"Task:
{prompt}

Proposed answer:
{answer}"#;

#[derive(Debug, Deserialize)]
struct Estimate {
    probability: f64,
}

/// Asks a model for the probability that an answer is correct.
pub struct LlmUncertaintyEstimator {
    llm: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl std::fmt::Debug for LlmUncertaintyEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmUncertaintyEstimator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmUncertaintyEstimator {
    pub const AGENT_NAME: &'static str = "uncertainty_estimator";

    pub fn new(llm: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { llm, config }
    }

    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            llm,
            AgentConfig::default()
                .with_temperature(0.0)
                .with_max_tokens(200),
        )
    }
}

#[async_trait]
impl UncertaintyEstimator for LlmUncertaintyEstimator {
    async fn estimate(&self, prompt: &str, answer: &str) -> Result<f64, CollaboratorError> {
        let user = ESTIMATOR_USER_TEMPLATE
            .replace("{prompt}", prompt)
            .replace("{answer}", answer);
        let estimate: Estimate = ask_json(
            self.llm.as_ref(),
            &self.config,
            Self::AGENT_NAME,
            ESTIMATOR_SYSTEM_PROMPT,
            &user,
        )
        .await?;

        if !estimate.probability.is_finite() {
            return Err(CollaboratorError::InvalidData(format!(
                "probability is not finite: {}",
                estimate.probability
            )));
        }
        Ok(estimate.probability.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::MockLlmProvider;

    async fn estimate(response: &str) -> Result<f64, CollaboratorError> {
        let llm = Arc::new(MockLlmProvider::new(response));
        LlmUncertaintyEstimator::with_defaults(llm)
            .estimate("6 * 7?", "42")
            .await
    }

    #[tokio::test]
    async fn test_estimate_is_clamped() {
        assert_eq!(estimate(r#"{"probability": 0.35}"#).await.unwrap(), 0.35);
        assert_eq!(estimate(r#"{"probability": 1.7}"#).await.unwrap(), 1.0);
        assert_eq!(estimate(r#"{"probability": -2}"#).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_prompt_contains_task_and_answer() {
        let llm = Arc::new(MockLlmProvider::new(r#"{"probability": 0.5}"#));
        let estimator = LlmUncertaintyEstimator::with_defaults(llm.clone());
        estimator.estimate("What is 2 + 2?", "4").await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests[0].max_tokens, Some(200));
        let user = &requests[0].messages[1].content;
        assert!(user.contains("What is 2 + 2?"));
        assert!(user.ends_with("4"));
    }
}
