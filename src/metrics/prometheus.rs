//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by frontier-forge and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all frontier-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Attempts by outcome (completed, skipped, failed) and domain.
pub static ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of total attempt rewards.
pub static REWARD_TOTAL: OnceLock<Histogram> = OnceLock::new();

/// Current difficulty per domain.
pub static DOMAIN_DIFFICULTY: OnceLock<GaugeVec> = OnceLock::new();

/// Windowed success rate per domain.
pub static DOMAIN_SUCCESS_RATE: OnceLock<GaugeVec> = OnceLock::new();

/// Scheduler updates that named an unknown domain.
pub static UNKNOWN_DOMAIN_UPDATES: OnceLock<CounterVec> = OnceLock::new();

/// Attempts rejected by the rate limiter, labeled by window.
pub static RATE_LIMITED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Tool steps executed, labeled by tool and final status.
pub static TOOL_STEPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Tool step retries, labeled by tool.
pub static TOOL_RETRIES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Attempt records written through the unlocked fallback path.
pub static LOG_FALLBACK_WRITES: OnceLock<Counter> = OnceLock::new();

/// Total LLM API requests, labeled by model and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// LLM API request latency in seconds, labeled by model.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls are harmless: the first registry wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric creation or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let attempts_total = CounterVec::new(
        Opts::new("frontier_forge_attempts_total", "Attempts by outcome"),
        &["outcome", "domain"],
    )?;

    let reward_total = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "frontier_forge_reward_total",
            "Distribution of total attempt rewards",
        )
        .buckets(vec![-2.0, -1.5, -1.0, -0.5, 0.0, 0.25, 0.5, 0.75, 1.0, 1.5]),
    )?;

    let domain_difficulty = GaugeVec::new(
        Opts::new("frontier_forge_domain_difficulty", "Current difficulty per domain"),
        &["domain"],
    )?;

    let domain_success_rate = GaugeVec::new(
        Opts::new(
            "frontier_forge_domain_success_rate",
            "Windowed success rate per domain",
        ),
        &["domain"],
    )?;

    let unknown_domain_updates = CounterVec::new(
        Opts::new(
            "frontier_forge_unknown_domain_updates_total",
            "Scheduler updates naming an unknown domain",
        ),
        &["domain"],
    )?;

    let rate_limited_total = CounterVec::new(
        Opts::new(
            "frontier_forge_rate_limited_total",
            "Attempts rejected by the rate limiter",
        ),
        &["window"],
    )?;

    let tool_steps_total = CounterVec::new(
        Opts::new("frontier_forge_tool_steps_total", "Tool steps executed"),
        &["tool", "status"],
    )?;

    let tool_retries_total = CounterVec::new(
        Opts::new("frontier_forge_tool_retries_total", "Tool step retries"),
        &["tool"],
    )?;

    let log_fallback_writes = Counter::new(
        "frontier_forge_log_fallback_writes_total",
        "Attempt records appended without holding the log lock",
    )?;

    let llm_requests_total = CounterVec::new(
        Opts::new("frontier_forge_llm_requests_total", "Total LLM API requests"),
        &["model", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "frontier_forge_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["model"],
    )?;

    registry.register(Box::new(attempts_total.clone()))?;
    registry.register(Box::new(reward_total.clone()))?;
    registry.register(Box::new(domain_difficulty.clone()))?;
    registry.register(Box::new(domain_success_rate.clone()))?;
    registry.register(Box::new(unknown_domain_updates.clone()))?;
    registry.register(Box::new(rate_limited_total.clone()))?;
    registry.register(Box::new(tool_steps_total.clone()))?;
    registry.register(Box::new(tool_retries_total.clone()))?;
    registry.register(Box::new(log_fallback_writes.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;

    // Racing initializers: whichever set first wins, the rest are dropped.
    let _ = REGISTRY.set(registry);
    let _ = ATTEMPTS_TOTAL.set(attempts_total);
    let _ = REWARD_TOTAL.set(reward_total);
    let _ = DOMAIN_DIFFICULTY.set(domain_difficulty);
    let _ = DOMAIN_SUCCESS_RATE.set(domain_success_rate);
    let _ = UNKNOWN_DOMAIN_UPDATES.set(unknown_domain_updates);
    let _ = RATE_LIMITED_TOTAL.set(rate_limited_total);
    let _ = TOOL_STEPS_TOTAL.set(tool_steps_total);
    let _ = TOOL_RETRIES_TOTAL.set(tool_retries_total);
    let _ = LOG_FALLBACK_WRITES.set(log_fallback_writes);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
