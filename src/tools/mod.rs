//! Tool definitions, registry and dependency-ordered plan execution.
//!
//! A solver describes multi-step work as a [`ToolPlan`]: an arena of steps,
//! each naming a registered tool and an input that may bind the results of
//! earlier steps. [`ToolExecutionGraph`] runs the plan in topological order,
//! retrying failing steps according to a [`RetryPolicy`]. A step that still
//! fails keeps its error as its result, and dependents run with that error
//! bound into their input; only a cyclic plan is rejected up front.
//!
//! Tools are registered against a closed set of [`ToolCapability`] variants.
//! A registry only accepts tools whose capability it was created to allow.

pub mod builtin;
pub mod graph;
pub mod plan;

pub use builtin::{HttpGetTool, ShellTool};
pub use graph::{Backoff, ExecutionReport, RetryPolicy, StepRecord, StepStatus, ToolExecutionGraph};
pub use plan::{substitute_results, InputPart, PlanStep, StepId, StepInput, StepSpec, ToolPlan};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during tool registration or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid input provided to the tool.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tool execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool execution timed out.
    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// No tool with this name is registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The registry refused the tool.
    #[error("Tool '{name}' rejected: {reason}")]
    RegistrationRejected { name: String, reason: String },
}

/// What a tool is able to touch. Registries allow a subset of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCapability {
    /// Pure computation with no side effects.
    Compute,
    /// Runs local processes.
    Shell,
    /// Talks to the network.
    Network,
    /// Reads or writes local files.
    Filesystem,
}

impl ToolCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCapability::Compute => "compute",
            ToolCapability::Shell => "shell",
            ToolCapability::Network => "network",
            ToolCapability::Filesystem => "filesystem",
        }
    }
}

/// Outcome reported by a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Structured output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub status: ToolStatus,
    /// Primary result value, preferred when binding into dependent steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Raw standard output, used for binding when there is no `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    /// Successful output carrying a result value.
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            status: ToolStatus::Ok,
            result: Some(result.into()),
            stdout: None,
            error: None,
        }
    }

    /// Successful output carrying only standard output.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Ok,
            result: None,
            stdout: Some(stdout.into()),
            error: None,
        }
    }

    /// Failed output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            result: None,
            stdout: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// The value substituted into dependents: `result`, else `stdout`, else
    /// the whole output as JSON.
    pub fn bound_value(&self) -> String {
        match (&self.result, &self.stdout) {
            (Some(Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(stdout)) => stdout.clone(),
            (None, None) => self.to_json().to_string(),
        }
    }

    /// JSON form used in attempt records.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        let status = match self.status {
            ToolStatus::Ok => "ok",
            ToolStatus::Error => "error",
        };
        obj.insert("status".to_string(), json!(status));
        if let Some(result) = &self.result {
            obj.insert("result".to_string(), result.clone());
        }
        if let Some(stdout) = &self.stdout {
            obj.insert("stdout".to_string(), json!(stdout));
        }
        if let Some(error) = &self.error {
            obj.insert("error".to_string(), json!(error));
        }
        Value::Object(obj)
    }
}

/// A capability the solver can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used in plans.
    fn name(&self) -> &str;

    /// Short description shown to the model when it plans.
    fn description(&self) -> &str;

    /// What the tool touches; checked at registration.
    fn capability(&self) -> ToolCapability;

    /// Runs the tool on a fully bound input string.
    ///
    /// Returning `Err` or an output with [`ToolStatus::Error`] both count as a
    /// failed try and are subject to the retry policy.
    async fn invoke(&self, input: &str) -> Result<ToolOutput, ToolError>;
}

/// Capability-checked registry of tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    allowed: HashSet<ToolCapability>,
}

impl ToolRegistry {
    /// Create an empty registry that accepts tools with the given capabilities.
    pub fn new(allowed: impl IntoIterator<Item = ToolCapability>) -> Self {
        Self {
            tools: HashMap::new(),
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Registry allowing compute and shell tools, with [`ShellTool`] registered.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new([ToolCapability::Compute, ToolCapability::Shell]);
        registry.tools.insert(
            builtin::SHELL_TOOL_NAME.to_string(),
            Arc::new(ShellTool::new()) as Arc<dyn Tool>,
        );
        registry
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::RegistrationRejected` when the capability is not
    /// allowed, the name is empty or contains whitespace or `.`/`{`/`}`, or a
    /// tool with the same name already exists.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        let reject = |reason: String| ToolError::RegistrationRejected {
            name: name.clone(),
            reason,
        };

        if name.is_empty()
            || name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '.' | '{' | '}'))
        {
            return Err(reject("name must be non-empty without whitespace, '.', '{' or '}'".to_string()));
        }
        if !self.allowed.contains(&tool.capability()) {
            return Err(reject(format!(
                "capability '{}' is not allowed by this registry",
                tool.capability().as_str()
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(reject("a tool with this name is already registered".to_string()));
        }

        tracing::debug!(tool = %name, capability = tool.capability().as_str(), "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn allows(&self, capability: ToolCapability) -> bool {
        self.allowed.contains(&capability)
    }

    /// Registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` pairs, sorted by name, for planning prompts.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedTool {
        name: &'static str,
        capability: ToolCapability,
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn capability(&self) -> ToolCapability {
            self.capability
        }

        async fn invoke(&self, input: &str) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(input))
        }
    }

    fn tool(name: &'static str, capability: ToolCapability) -> Arc<dyn Tool> {
        Arc::new(NamedTool { name, capability })
    }

    #[test]
    fn test_register_checks_capability() {
        let mut registry = ToolRegistry::new([ToolCapability::Compute]);
        assert!(registry.register(tool("calc", ToolCapability::Compute)).is_ok());

        let err = registry
            .register(tool("fetch", ToolCapability::Network))
            .expect_err("network is not allowed");
        assert!(matches!(err, ToolError::RegistrationRejected { ref name, .. } if name == "fetch"));
        assert_eq!(registry.list_tools(), vec!["calc"]);
    }

    #[test]
    fn test_register_rejects_bad_and_duplicate_names() {
        let mut registry = ToolRegistry::new([ToolCapability::Compute]);
        assert!(registry.register(tool("", ToolCapability::Compute)).is_err());
        assert!(registry.register(tool("two words", ToolCapability::Compute)).is_err());
        assert!(registry.register(tool("a.result", ToolCapability::Compute)).is_err());
        assert!(registry.register(tool("calc", ToolCapability::Compute)).is_ok());
        assert!(registry.register(tool("calc", ToolCapability::Compute)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_registry() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.get("shell").is_some());
        assert!(registry.allows(ToolCapability::Shell));
        assert!(!registry.allows(ToolCapability::Network));
    }

    #[test]
    fn test_bound_value_preference() {
        assert_eq!(ToolOutput::ok("42").bound_value(), "42");
        assert_eq!(ToolOutput::ok(json!({"a": 1})).bound_value(), r#"{"a":1}"#);
        assert_eq!(ToolOutput::stdout("hello").bound_value(), "hello");

        let err = ToolOutput::error("boom").bound_value();
        let parsed: Value = serde_json::from_str(&err).expect("error output is JSON");
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["error"], "boom");
    }
}
