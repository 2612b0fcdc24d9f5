//! Plan-executing solver.
//!
//! The model answers with a tool plan and an answer template. The plan runs
//! through a [`ToolExecutionGraph`]; `{{step.result}}` bindings in the
//! template are then filled from the step outputs. A plan without steps is a
//! direct answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ask_json, AgentConfig};
use crate::attempt::Task;
use crate::coevolution::{SolveOutput, Solver};
use crate::error::CollaboratorError;
use crate::llm::LlmProvider;
use crate::tools::{substitute_results, StepSpec, ToolExecutionGraph, ToolPlan};

const SOLVER_SYSTEM_PROMPT: &str = r#"You solve tasks, optionally by running tools.

Available tools:
{tools}

Plan tool calls as steps. A step's input may contain {{<step id>.result}} to use the result of an earlier step; that also makes it a dependency. List any other ordering constraints in "depends_on". If no tool is needed, return an empty "steps" list.

The "answer" is your final answer. It may contain {{<step id>.result}} bindings, which are replaced with the step results after the plan runs.

You MUST respond with ONLY a valid JSON object in this exact format:
{
  "steps": [
    {"id": "<unique step id>", "tool": "<tool name>", "input": "<tool input>", "depends_on": ["<step id>"]}
  ],
  "answer": "<final answer or answer template>"
}"#;

const SOLVER_USER_TEMPLATE: &str = r#"Task ({domain}):
{prompt}

Constraints:
{constraints}"#;

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    steps: Vec<StepSpec>,
    answer: String,
}

/// Solves tasks with an LLM-written tool plan.
pub struct LlmSolver {
    llm: Arc<dyn LlmProvider>,
    graph: ToolExecutionGraph,
    config: AgentConfig,
}

impl std::fmt::Debug for LlmSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSolver")
            .field("config", &self.config)
            .field("tools", &self.graph.registry().list_tools())
            .finish_non_exhaustive()
    }
}

impl LlmSolver {
    pub const AGENT_NAME: &'static str = "solver";

    pub fn new(llm: Arc<dyn LlmProvider>, graph: ToolExecutionGraph, config: AgentConfig) -> Self {
        Self { llm, graph, config }
    }

    pub fn graph(&self) -> &ToolExecutionGraph {
        &self.graph
    }

    fn system_prompt(&self) -> String {
        let tools = self
            .graph
            .registry()
            .descriptions()
            .into_iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect::<Vec<_>>();
        let tools = if tools.is_empty() {
            "(none)".to_string()
        } else {
            tools.join("\n")
        };
        SOLVER_SYSTEM_PROMPT.replace("{tools}", &tools)
    }

    fn format_prompt(task: &Task) -> String {
        let constraints = if task.constraints.is_empty() {
            "(none)".to_string()
        } else {
            task.constraints
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        SOLVER_USER_TEMPLATE
            .replace("{domain}", &task.domain)
            .replace("{prompt}", &task.prompt)
            .replace("{constraints}", &constraints)
    }
}

#[async_trait]
impl Solver for LlmSolver {
    async fn solve(&self, task: &Task) -> Result<SolveOutput, CollaboratorError> {
        let plan: PlanResponse = ask_json(
            self.llm.as_ref(),
            &self.config,
            Self::AGENT_NAME,
            &self.system_prompt(),
            &Self::format_prompt(task),
        )
        .await?;

        let mut messages = vec![format!(
            "plan: {} step(s), answer template: {}",
            plan.steps.len(),
            plan.answer
        )];

        if plan.steps.is_empty() {
            return Ok(SolveOutput {
                tool_calls: Vec::new(),
                result: plan.answer.trim().to_string(),
                messages,
            });
        }

        let tool_plan = ToolPlan::from_specs(&plan.steps)?;
        let report = self.graph.execute(&tool_plan).await?;
        tracing::debug!(
            task_id = %task.id,
            steps = report.len(),
            failed = report.failed(),
            "Tool plan executed"
        );

        for record in report.records() {
            messages.push(format!(
                "{} [{}] {}: {}",
                record.name,
                record.tool,
                record.status.as_str(),
                record.output.bound_value()
            ));
        }

        let result = substitute_results(&plan.answer, |name| {
            report.result(name).map(|output| output.bound_value())
        });

        Ok(SolveOutput {
            tool_calls: report.tool_calls(),
            result: result.trim().to_string(),
            messages,
        })
    }
}
