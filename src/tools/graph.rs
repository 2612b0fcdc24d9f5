//! Sequential, dependency-ordered execution of a [`ToolPlan`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::plan::{StepId, ToolPlan};
use super::{ToolOutput, ToolRegistry};
use crate::attempt::ToolCallRecord;
use crate::error::PlanError;
use crate::metrics::MetricsCollector;

/// Delay inserted before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

/// How often a failing step is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional tries after the first one.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Lifecycle of a step. Records in an [`ExecutionReport`] are always terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub id: StepId,
    pub name: String,
    pub tool: String,
    /// Input after bindings were rendered.
    pub input: String,
    pub status: StepStatus,
    /// Number of invocations; 0 when the tool was not registered.
    pub attempts: u32,
    /// Final output; for a failed step this is the error output.
    pub output: ToolOutput,
}

/// Step records in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    records: Vec<StepRecord>,
}

impl ExecutionReport {
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Step ids in the order they ran.
    pub fn order(&self) -> Vec<StepId> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn record(&self, name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn result(&self, name: &str) -> Option<&ToolOutput> {
        self.record(name).map(|r| &r.output)
    }

    /// Final output of every step, keyed by step name.
    pub fn results(&self) -> HashMap<String, ToolOutput> {
        self.records
            .iter()
            .map(|r| (r.name.clone(), r.output.clone()))
            .collect()
    }

    /// The calls in the form stored on attempt records.
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.records
            .iter()
            .map(|r| ToolCallRecord {
                tool: r.tool.clone(),
                input: r.input.clone(),
                status: r.output.status,
                output: r.output.to_json(),
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Runs plans against a registry.
///
/// Steps run one at a time in topological order. A step is retried while the
/// tool returns `Err` or an error status; once retries are exhausted its error
/// output becomes its result and dependents still run with it bound in.
pub struct ToolExecutionGraph {
    registry: Arc<ToolRegistry>,
    policy: RetryPolicy,
    metrics: MetricsCollector,
}

impl ToolExecutionGraph {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            policy: RetryPolicy::default(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Executes every step of `plan` exactly once.
    ///
    /// # Errors
    ///
    /// Only `PlanError::CircularDependency`, raised before any tool runs.
    pub async fn execute(&self, plan: &ToolPlan) -> Result<ExecutionReport, PlanError> {
        let order = plan.topological_order()?;

        let mut outputs: Vec<Option<ToolOutput>> = vec![None; plan.len()];
        let mut records = Vec::with_capacity(plan.len());

        for id in order {
            let Some(step) = plan.step(id) else {
                continue;
            };

            let input = step
                .input
                .render(|dep| outputs.get(dep.index()).and_then(|o| o.as_ref()).map(|o| o.bound_value()));

            tracing::debug!(
                step = %step.name,
                tool = %step.tool,
                status = StepStatus::Running.as_str(),
                "Running tool step"
            );

            let (output, attempts) = self.run_step(&step.tool, &input).await;
            let status = if output.is_ok() {
                StepStatus::Success
            } else {
                StepStatus::Failed
            };

            if status == StepStatus::Failed {
                tracing::warn!(
                    step = %step.name,
                    tool = %step.tool,
                    attempts,
                    error = output.error.as_deref().unwrap_or(""),
                    "Tool step failed; dependents receive its error"
                );
            }
            self.metrics.record_tool_step(
                &step.tool,
                status.as_str(),
                attempts.saturating_sub(1),
            );

            outputs[id.index()] = Some(output.clone());
            records.push(StepRecord {
                id,
                name: step.name.clone(),
                tool: step.tool.clone(),
                input,
                status,
                attempts,
                output,
            });
        }

        Ok(ExecutionReport { records })
    }

    /// Invokes a tool under the retry policy. Returns the final output and the
    /// number of invocations.
    async fn run_step(&self, tool_name: &str, input: &str) -> (ToolOutput, u32) {
        let Some(tool) = self.registry.get(tool_name) else {
            return (ToolOutput::error(format!("unknown tool: {}", tool_name)), 0);
        };

        let mut last = ToolOutput::error("tool was not invoked");
        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                tracing::debug!(tool = %tool_name, retry = attempt, delay_ms = delay.as_millis() as u64, "Retrying tool step");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match tool.invoke(input).await {
                Ok(output) if output.is_ok() => return (output, attempt + 1),
                Ok(output) => last = output,
                Err(e) => last = ToolOutput::error(e.to_string()),
            }
        }

        (last, self.policy.max_retries + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::plan::{StepInput, StepSpec};
    use crate::tools::{Tool, ToolCapability, ToolError, ToolStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Echoes its input and logs every call.
    struct EchoTool {
        calls: Arc<Mutex<Vec<String>>>,
    }

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
            self.calls.lock().unwrap().push(input.to_string());
            Ok(ToolOutput::ok(input))
        }
    }

    /// Fails the first `failures` calls.
    struct FlakyTool {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "fails a few times"
        }

        fn capability(&self) -> ToolCapability {
            ToolCapability::Compute
        }

        async fn invoke(&self, _input: &str) -> Result<ToolOutput, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ToolError::ExecutionFailed(format!("boom {}", n)))
            } else {
                Ok(ToolOutput::stdout("recovered"))
            }
        }
    }

    struct Fixture {
        graph: ToolExecutionGraph,
        echo_calls: Arc<Mutex<Vec<String>>>,
        flaky_calls: Arc<AtomicUsize>,
    }

    fn fixture(flaky_failures: usize, policy: RetryPolicy) -> Fixture {
        let echo_calls = Arc::new(Mutex::new(Vec::new()));
        let flaky_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new([ToolCapability::Compute]);
        registry
            .register(Arc::new(EchoTool {
                calls: echo_calls.clone(),
            }))
            .unwrap();
        registry
            .register(Arc::new(FlakyTool {
                failures: flaky_failures,
                calls: flaky_calls.clone(),
            }))
            .unwrap();
        Fixture {
            graph: ToolExecutionGraph::new(Arc::new(registry)).with_policy(policy),
            echo_calls,
            flaky_calls,
        }
    }

    fn spec(id: &str, tool: &str, input: &str, depends_on: &[&str]) -> StepSpec {
        StepSpec {
            id: id.to_string(),
            tool: tool.to_string(),
            input: input.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_every_step_runs_once_after_dependencies() {
        let fx = fixture(0, RetryPolicy::default());
        let plan = ToolPlan::from_specs(&[
            spec("c", "echo", "c<{{b.result}}>", &[]),
            spec("b", "echo", "b<{{a.result}}>", &[]),
            spec("a", "echo", "a", &[]),
        ])
        .unwrap();

        let report = fx.graph.execute(&plan).await.unwrap();
        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(
            *fx.echo_calls.lock().unwrap(),
            vec!["a".to_string(), "b<a>".to_string(), "c<b<a>>".to_string()]
        );
        assert_eq!(report.result("c").unwrap().bound_value(), "c<b<a>>");
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_invocation() {
        let fx = fixture(0, RetryPolicy::default());
        let plan = ToolPlan::from_specs(&[
            spec("a", "echo", "{{b.result}}", &[]),
            spec("b", "flaky", "", &["a"]),
        ])
        .unwrap();

        let err = fx.graph.execute(&plan).await.unwrap_err();
        assert!(matches!(err, PlanError::CircularDependency(_)));
        assert!(fx.echo_calls.lock().unwrap().is_empty());
        assert_eq!(fx.flaky_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_step_result_flows_to_dependent() {
        // flaky never recovers within the default two retries.
        let fx = fixture(usize::MAX, RetryPolicy::default());
        let plan = ToolPlan::from_specs(&[
            spec("A", "flaky", "", &[]),
            spec("B", "echo", "saw {{A.result}}", &[]),
        ])
        .unwrap();

        let report = fx.graph.execute(&plan).await.unwrap();
        let a = report.record("A").unwrap();
        assert_eq!(a.status, StepStatus::Failed);
        assert_eq!(a.attempts, 3);
        assert_eq!(fx.flaky_calls.load(Ordering::SeqCst), 3);

        let b = report.record("B").unwrap();
        assert_eq!(b.status, StepStatus::Success);
        let bound = b.input.strip_prefix("saw ").unwrap();
        let error: serde_json::Value = serde_json::from_str(bound).unwrap();
        assert_eq!(error["status"], "error");
        assert_eq!(error["error"], "Execution failed: boom 2");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let fx = fixture(2, RetryPolicy::new(2));
        let mut plan = ToolPlan::new();
        plan.add_step("only", "flaky", StepInput::default()).unwrap();

        let report = fx.graph.execute(&plan).await.unwrap();
        let record = report.record("only").unwrap();
        assert_eq!(record.status, StepStatus::Success);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.output.bound_value(), "recovered");

        let fx = fixture(2, RetryPolicy::new(1));
        let report = fx.graph.execute(&plan).await.unwrap();
        let record = report.record("only").unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_step() {
        let fx = fixture(0, RetryPolicy::default());
        let plan = ToolPlan::from_specs(&[
            spec("x", "teleport", "", &[]),
            spec("y", "echo", "{{x.result}}", &[]),
        ])
        .unwrap();

        let report = fx.graph.execute(&plan).await.unwrap();
        let x = report.record("x").unwrap();
        assert_eq!(x.status, StepStatus::Failed);
        assert_eq!(x.attempts, 0);
        assert!(x.output.error.as_deref().unwrap().contains("unknown tool"));
        assert_eq!(report.record("y").unwrap().status, StepStatus::Success);
        assert!(report.records().iter().all(|r| r.status.is_terminal()));

        let calls = report.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool, "teleport");
        assert_eq!(calls[0].status, ToolStatus::Error);
        assert_eq!(calls[1].status, ToolStatus::Ok);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Success.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::new(5).with_backoff(Backoff::Exponential {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(4), Duration::from_millis(50));

        let fixed = RetryPolicy::new(1).with_backoff(Backoff::Fixed(Duration::from_millis(7)));
        assert_eq!(fixed.delay_for(3), Duration::from_millis(7));
        assert_eq!(RetryPolicy::default().delay_for(1), Duration::ZERO);
    }
}
