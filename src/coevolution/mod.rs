//! The co-evolution loop.
//!
//! Each cycle of [`CoEvolutionCoordinator::run_attempt`]:
//!
//! 1. checks the per-minute and per-hour [`RateLimiter`]
//! 2. merges the curriculum signal with caller overrides
//! 3. generates a task and validates it
//! 4. solves it, verifies the result and optionally asks a
//!    [`ConsensusChecker`] to confirm a pass
//! 5. estimates success probability and novelty
//! 6. scores the attempt and appends it to the attempt log
//! 7. reports the outcome to the curriculum
//!
//! The outcome is always tagged: completed, skipped (rate limited or task
//! rejected) or failed at a named stage. Only completed attempts reach the
//! curriculum.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod rate_limit;

pub use collaborators::{
    BasicTaskValidator, CheckResult, Consensus, ConsensusChecker, SolveOutput, Solver,
    TaskGenerator, TaskValidation, TaskValidator, UncertaintyEstimator, Verification, Verifier,
};
pub use config::{CoordinatorConfig, ForgeConfig, DEFAULT_MAX_ATTEMPTS};
pub use coordinator::{CoEvolutionCoordinator, Collaborators, RunSummary};
pub use rate_limit::{RateLimitExceeded, RateLimiter, RateWindow};
