//! Curriculum control: keeping task difficulty at the frontier.
//!
//! The frontier is the region where the solver succeeds about as often as the
//! configured target rate. Two pieces cooperate:
//!
//! - [`DomainDifficultyTracker`] keeps a window of the last 20 outcomes for a
//!   single domain and moves that domain's difficulty in 0.05 steps whenever
//!   the windowed success rate leaves the tolerance band around the target.
//! - [`CurriculumScheduler`] owns one tracker per domain, keeps a global
//!   success-rate EMA, and every few updates switches the active domain to the
//!   one closest to the frontier (occasionally the runner-up, for exploration).
//!
//! # Usage
//!
//! ```rust,ignore
//! use frontier_forge::curriculum::{CurriculumConfig, CurriculumScheduler};
//!
//! let mut scheduler = CurriculumScheduler::new(CurriculumConfig::new(["math", "code"]))?;
//! let signal = scheduler.next_signal();
//! // ... generate, solve and verify a task for `signal` ...
//! scheduler.update(true, &signal.domain);
//! ```

pub mod config;
pub mod scheduler;
pub mod tracker;

pub use config::CurriculumConfig;
pub use scheduler::{CurriculumScheduler, DifficultySignal, SchedulerState, GLOBAL_EMA_ALPHA};
pub use tracker::{
    DifficultyChange, DomainDifficultyTracker, DomainState, DIFFICULTY_STEP, OUTCOME_WINDOW,
};
