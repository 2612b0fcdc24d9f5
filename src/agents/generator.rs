//! Task generation from a curriculum request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ask_json, AgentConfig};
use crate::attempt::{Task, TaskRequest};
use crate::coevolution::TaskGenerator;
use crate::error::CollaboratorError;
use crate::llm::LlmProvider;

const GENERATOR_SYSTEM_PROMPT: &str = r#"You write self-contained practice tasks for an AI solver.

The task must match the requested domain and difficulty. Difficulty runs from 0.0 (trivial) to 1.0 (at the edge of what a strong solver can do). The task must have one checkable answer, must not depend on information outside the prompt, and must be answerable in plain text.

If the solver would benefit from running commands or fetching a URL, you may say so in the prompt, but the answer must still be a short string.

You MUST respond with ONLY a valid JSON object in this exact format:
{
  "prompt": "<the task as shown to the solver>",
  "constraints": ["<constraint the answer must satisfy>"],
  "expected_answer": "<the correct answer, or null if it cannot be stated exactly>"
}"#;

const GENERATOR_USER_TEMPLATE: &str = r#"Domain: {domain}
Difficulty: {difficulty} ({band})
Extra parameters: {parameters}

Write one new task."#;

#[derive(Debug, Deserialize)]
struct GeneratedTask {
    prompt: String,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    expected_answer: Option<String>,
}

fn difficulty_band(difficulty: f64) -> &'static str {
    match difficulty {
        d if d < 0.25 => "easy",
        d if d < 0.5 => "moderate",
        d if d < 0.75 => "hard",
        _ => "very hard",
    }
}

/// Writes tasks with an LLM.
pub struct LlmTaskGenerator {
    llm: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl std::fmt::Debug for LlmTaskGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTaskGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmTaskGenerator {
    pub const AGENT_NAME: &'static str = "task_generator";

    pub fn new(llm: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { llm, config }
    }

    /// Generation runs warmer than judging.
    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, AgentConfig::default().with_temperature(0.9))
    }

    fn format_prompt(request: &TaskRequest) -> String {
        let parameters = if request.parameters.is_empty() {
            "none".to_string()
        } else {
            serde_json::Value::Object(request.parameters.clone()).to_string()
        };
        GENERATOR_USER_TEMPLATE
            .replace("{domain}", &request.domain)
            .replace("{difficulty}", &format!("{:.2}", request.difficulty))
            .replace("{band}", difficulty_band(request.difficulty))
            .replace("{parameters}", &parameters)
    }
}

#[async_trait]
impl TaskGenerator for LlmTaskGenerator {
    async fn generate(&self, request: &TaskRequest) -> Result<Task, CollaboratorError> {
        let generated: GeneratedTask = ask_json(
            self.llm.as_ref(),
            &self.config,
            Self::AGENT_NAME,
            GENERATOR_SYSTEM_PROMPT,
            &Self::format_prompt(request),
        )
        .await?;

        let mut task = Task::new(
            request.domain.as_str(),
            request.difficulty,
            generated.prompt.trim(),
        )
        .with_constraints(generated.constraints);
        if let Some(answer) = generated.expected_answer.filter(|a| !a.trim().is_empty()) {
            task = task.with_verifier_spec(json!({ "expected_answer": answer }));
        }

        tracing::debug!(
            task_id = %task.id,
            domain = %task.domain,
            difficulty = task.difficulty,
            "Generated task"
        );
        Ok(task)
    }
}
