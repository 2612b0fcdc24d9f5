//! Attempts: the unit of work of the co-evolution loop.
//!
//! An attempt is created per coordinator cycle, finalized once into an
//! [`AttemptRecord`], and appended to the [`AttemptLog`]. Records are never
//! rewritten.

pub mod log;
pub mod types;

pub use log::{AppendReceipt, AttemptLog, DomainSummary, LogSummary};
pub use types::{
    AttemptOutcome, AttemptRecord, AttemptStage, FailureKind, SkipReason, Task, TaskRequest,
    ToolCallRecord, VerificationStatus, ATTEMPT_SCHEMA_VERSION,
};
