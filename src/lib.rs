//! frontier-forge: a self-improving task generation loop for LLM training.
//!
//! A curriculum scheduler picks a domain and difficulty at the edge of the
//! solver's ability; a generator writes a task; a solver attempts it, possibly
//! through a dependency graph of tool calls; the result is verified, scored by
//! a reward engine and appended to a shared attempt log. Outcomes feed back
//! into the curriculum.

// Core modules
pub mod agents;
pub mod attempt;
pub mod coevolution;
pub mod curriculum;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod novelty;
pub mod reward;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use attempt::{AttemptLog, AttemptOutcome, AttemptRecord, Task, TaskRequest};
pub use coevolution::{CoEvolutionCoordinator, Collaborators, ForgeConfig, RunSummary};
pub use curriculum::{CurriculumConfig, CurriculumScheduler, DifficultySignal};
pub use error::{
    CollaboratorError, ConfigError, CoordinatorError, LlmError, PersistenceError, PlanError,
};
pub use reward::{RewardEngine, RewardWeights};
pub use tools::{ToolExecutionGraph, ToolPlan, ToolRegistry};
