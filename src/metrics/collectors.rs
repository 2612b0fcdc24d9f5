//! High-level metric recording for frontier-forge operations.
//!
//! `MetricsCollector` wraps the raw Prometheus statics with consistent labels.
//! Every method is a no-op until [`super::init_metrics`] has run, so library
//! code can record unconditionally.

use super::prometheus::{
    ATTEMPTS_TOTAL, DOMAIN_DIFFICULTY, DOMAIN_SUCCESS_RATE, LLM_LATENCY, LLM_REQUESTS_TOTAL,
    LOG_FALLBACK_WRITES, RATE_LIMITED_TOTAL, REWARD_TOTAL, TOOL_RETRIES_TOTAL, TOOL_STEPS_TOTAL,
    UNKNOWN_DOMAIN_UPDATES,
};

/// Metrics collector for recording operational metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of one attempt.
    ///
    /// # Arguments
    ///
    /// * `outcome` - "completed", "skipped" or "failed"
    /// * `domain` - Task domain, or "none" when no task was generated
    /// * `total_reward` - Reward for completed attempts
    pub fn record_attempt(&self, outcome: &str, domain: &str, total_reward: Option<f64>) {
        if let Some(attempts) = ATTEMPTS_TOTAL.get() {
            attempts.with_label_values(&[outcome, domain]).inc();
        }

        if let (Some(histogram), Some(reward)) = (REWARD_TOTAL.get(), total_reward) {
            histogram.observe(reward);
        }

        tracing::trace!(
            outcome = outcome,
            domain = domain,
            total_reward = ?total_reward,
            "Recorded attempt metric"
        );
    }

    /// Record a domain's current difficulty and success rate.
    pub fn record_domain_state(&self, domain: &str, difficulty: f64, success_rate: f64) {
        if let Some(gauge) = DOMAIN_DIFFICULTY.get() {
            gauge.with_label_values(&[domain]).set(difficulty);
        }
        if let Some(gauge) = DOMAIN_SUCCESS_RATE.get() {
            gauge.with_label_values(&[domain]).set(success_rate);
        }
    }

    pub fn record_unknown_domain(&self, domain: &str) {
        if let Some(counter) = UNKNOWN_DOMAIN_UPDATES.get() {
            counter.with_label_values(&[domain]).inc();
        }
    }

    /// Record a rate-limit rejection for the given window ("minute" or "hour").
    pub fn record_rate_limited(&self, window: &str) {
        if let Some(counter) = RATE_LIMITED_TOTAL.get() {
            counter.with_label_values(&[window]).inc();
        }
    }

    /// Record a finished tool step and the retries it consumed.
    pub fn record_tool_step(&self, tool: &str, status: &str, retries: u32) {
        if let Some(counter) = TOOL_STEPS_TOTAL.get() {
            counter.with_label_values(&[tool, status]).inc();
        }
        if retries > 0 {
            if let Some(counter) = TOOL_RETRIES_TOTAL.get() {
                counter.with_label_values(&[tool]).inc_by(retries as f64);
            }
        }

        tracing::trace!(tool = tool, status = status, retries = retries, "Recorded tool step");
    }

    pub fn record_log_fallback(&self) {
        if let Some(counter) = LOG_FALLBACK_WRITES.get() {
            counter.inc();
        }
    }

    /// Record an LLM API request.
    pub fn record_llm_request(&self, model: &str, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = LLM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[model, status]).inc();
        }
        if let Some(latency) = LLM_LATENCY.get() {
            latency.with_label_values(&[model]).observe(latency_secs);
        }

        tracing::trace!(
            model = model,
            status = status,
            latency_secs = latency_secs,
            "Recorded LLM request metric"
        );
    }
}
