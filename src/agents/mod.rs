//! LLM-backed collaborators for the co-evolution loop.
//!
//! Each agent implements one collaborator trait from [`crate::coevolution`]
//! on top of an [`LlmProvider`]: prompts are fixed templates, responses are
//! JSON extracted from free-form output with
//! [`parse_json_response`](crate::utils::parse_json_response).

pub mod consensus;
pub mod estimator;
pub mod generator;
pub mod solver;
pub mod verifier;

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::llm::{complete, GenerationRequest, LlmProvider, Message};
use crate::utils::parse_json_response;

pub use consensus::LlmConsensusChecker;
pub use estimator::LlmUncertaintyEstimator;
pub use generator::LlmTaskGenerator;
pub use solver::LlmSolver;
pub use verifier::LlmVerifier;

/// Generation settings shared by the agents.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier; empty uses the client's default model.
    pub model: String,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Maximum tokens for LLM response.
    pub max_tokens: u32,
    /// Attempts per call when the response cannot be parsed.
    pub parse_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.3,
            max_tokens: 2000,
            parse_attempts: 3,
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature for LLM generation.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Sets the maximum tokens for LLM response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_parse_attempts(mut self, attempts: u32) -> Self {
        self.parse_attempts = attempts.max(1);
        self
    }
}

/// Sends a system/user exchange and parses the JSON answer as `T`.
///
/// Unparseable or empty responses are retried up to
/// `config.parse_attempts` times; transport errors return immediately.
pub(crate) async fn ask_json<T: DeserializeOwned>(
    llm: &dyn LlmProvider,
    config: &AgentConfig,
    agent: &'static str,
    system: &str,
    user: &str,
) -> Result<T, LlmError> {
    let attempts = config.parse_attempts.max(1);
    let mut attempt = 1;
    loop {
        let request = GenerationRequest::new(
            config.model.as_str(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

        let parsed = match complete(llm, request).await {
            Ok(content) => parse_json_response::<T>(&content),
            Err(e) => Err(e),
        };

        match parsed {
            Err(e @ (LlmError::ParseError(_) | LlmError::EmptyResponse)) if attempt < attempts => {
                tracing::warn!(agent, attempt, error = %e, "Unusable LLM response, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}
