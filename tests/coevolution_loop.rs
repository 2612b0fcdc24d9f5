//! End-to-end tests of the co-evolution loop through the public API, with the
//! LLM-backed agents driven by a scripted provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use frontier_forge::agents::{
    AgentConfig, LlmSolver, LlmTaskGenerator, LlmUncertaintyEstimator, LlmVerifier,
};
use frontier_forge::attempt::{AttemptOutcome, VerificationStatus};
use frontier_forge::coevolution::{CoEvolutionCoordinator, Collaborators, CoordinatorConfig};
use frontier_forge::curriculum::{CurriculumConfig, CurriculumScheduler};
use frontier_forge::error::LlmError;
use frontier_forge::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use frontier_forge::novelty::InMemoryNoveltyIndex;
use frontier_forge::reward::{RewardEngine, RewardWeights};
use frontier_forge::tools::{
    RetryPolicy, StepSpec, StepStatus, Tool, ToolCapability, ToolError, ToolExecutionGraph, ToolOutput,
    ToolPlan, ToolRegistry, ToolStatus,
};

/// Answers each agent by recognising its system prompt.
struct ScriptedLlm {
    tasks: AtomicUsize,
    roles: Mutex<Vec<&'static str>>,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            tasks: AtomicUsize::new(0),
            roles: Mutex::new(Vec::new()),
        }
    }

    fn reply(&self, system: &str) -> (&'static str, String) {
        if system.contains("practice tasks") {
            let n = self.tasks.fetch_add(1, Ordering::SeqCst);
            let task = format!(
                r#"{{"prompt": "Task {n}: print the number four using the shell.", "constraints": ["digits only"], "expected_answer": "4"}}"#
            );
            ("generator", task)
        } else if system.contains("solve tasks") {
            (
                "solver",
                r#"```json
{"steps": [{"id": "run", "tool": "shell", "input": "echo 4"}], "answer": "{{run.result}}"}
```"#
                    .to_string(),
            )
        } else if system.contains("strict grader") {
            ("verifier", r#"{"status": "fail", "detail": "no"}"#.to_string())
        } else {
            ("estimator", r#"{"probability": 0.5}"#.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let system = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let (role, content) = self.reply(&system);
        self.roles.lock().unwrap().push(role);
        Ok(GenerationResponse {
            id: "mock-id".to_string(),
            model: "mock-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

fn coordinator(dir: &TempDir, llm: Arc<ScriptedLlm>) -> CoEvolutionCoordinator {
    let registry = Arc::new(ToolRegistry::with_default_tools());
    let graph = ToolExecutionGraph::new(registry);
    let collaborators = Collaborators::new(
        Arc::new(LlmTaskGenerator::with_defaults(llm.clone())),
        Arc::new(LlmSolver::new(llm.clone(), graph, AgentConfig::default())),
        Arc::new(LlmVerifier::with_defaults(llm.clone())),
        Arc::new(LlmUncertaintyEstimator::with_defaults(llm)),
        Arc::new(InMemoryNoveltyIndex::default()),
    );
    let scheduler = CurriculumScheduler::new(
        CurriculumConfig::new(["math"])
            .with_initial_difficulty(0.3)
            .with_exploration_probability(0.0)
            .with_seed(11),
    )
    .unwrap();
    let config = CoordinatorConfig::default()
        .with_rate_limits(1_000, 10_000)
        .with_log_path(dir.path().join("attempts.jsonl"));

    CoEvolutionCoordinator::new(
        config,
        scheduler,
        RewardEngine::new(RewardWeights::default()),
        collaborators,
    )
    .unwrap()
}

#[tokio::test]
async fn test_sustained_success_raises_difficulty_to_the_ceiling() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new());
    let mut coordinator = coordinator(&dir, llm.clone());

    let summary = coordinator.run(20).await.unwrap();
    assert_eq!(summary.attempts, 20);
    assert_eq!(summary.completed, 20);
    assert_eq!(summary.successes, 20);

    let tracker = coordinator.scheduler().tracker("math").unwrap();
    assert_eq!(tracker.current_difficulty(), 1.0);
    assert_eq!(tracker.success_rate(), 1.0);
    assert_eq!(tracker.total_attempts(), 20);

    // The expected answer matches the shell output, so the judge is never asked.
    assert!(!llm.roles.lock().unwrap().contains(&"verifier"));

    let records = coordinator.log().read_all().await.unwrap();
    assert_eq!(records.len(), 20);
    let first = &records[0];
    assert_eq!(first.domain, "math");
    assert_eq!(first.difficulty, 0.3);
    assert_eq!(first.result, "4");
    assert_eq!(first.verification_status, VerificationStatus::Pass);
    assert_eq!(first.tool_calls.len(), 1);
    assert_eq!(first.tool_calls[0].tool, "shell");
    assert_eq!(first.tool_calls[0].status, ToolStatus::Ok);
    assert!(records[19].difficulty > first.difficulty);

    let summary = coordinator.log().summarize().await.unwrap();
    assert_eq!(summary.total, 20);
    assert_eq!(summary.by_domain["math"].successes, 20);
}

#[tokio::test]
async fn test_overrides_reach_the_generated_task() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new());
    let mut coordinator = coordinator(&dir, llm);

    let overrides = serde_json::json!({"difficulty": 0.85, "topic": "arithmetic"});
    let outcome = coordinator
        .run_attempt(overrides.as_object())
        .await
        .unwrap();

    let AttemptOutcome::Completed(record) = outcome else {
        panic!("expected a completed attempt, got {:?}", outcome);
    };
    assert_eq!(record.difficulty, 0.85);
    assert!(record.success);
}

/// Always reports failure.
struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Compute
    }

    async fn invoke(&self, _input: &str) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed("disk on fire".to_string()))
    }
}

/// Echoes its input.
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "echo input"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Compute
    }

    async fn invoke(&self, input: &str) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(input))
    }
}

#[tokio::test]
async fn test_failed_step_output_flows_into_dependents() {
    let mut registry = ToolRegistry::new([ToolCapability::Compute]);
    registry.register(Arc::new(BrokenTool)).unwrap();
    registry.register(Arc::new(EchoTool)).unwrap();
    let graph = ToolExecutionGraph::new(Arc::new(registry)).with_policy(RetryPolicy::new(1));

    let specs: Vec<StepSpec> = serde_json::from_value(serde_json::json!([
        {"id": "b", "tool": "echo", "input": "got: {{a.result}}"},
        {"id": "a", "tool": "broken", "input": "x"}
    ]))
    .unwrap();
    let plan = ToolPlan::from_specs(&specs).unwrap();
    let report = graph.execute(&plan).await.unwrap();

    let names: Vec<&str> = report.records().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    let a = report.record("a").unwrap();
    assert_eq!(a.status, StepStatus::Failed);
    assert_eq!(a.attempts, 2);

    let b = report.record("b").unwrap();
    assert_eq!(b.status, StepStatus::Success);
    assert!(b.input.starts_with("got: "));
    assert!(b.input.contains("disk on fire"));

    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
}
