//! Metrics module for Prometheus-based monitoring.
//!
//! Covers the co-evolution loop: attempt outcomes, rewards, per-domain
//! curriculum state, rate limiting, tool execution, attempt-log fallbacks and
//! LLM usage.
//!
//! # Example
//!
//! ```ignore
//! use frontier_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! MetricsCollector::new().record_attempt("completed", "math", Some(0.42));
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};
