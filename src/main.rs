//! frontier-forge entry point.
//!
//! Configuration comes from the environment (`FORGE_*`, `LITELLM_*`). Runs
//! `FORGE_MAX_ATTEMPTS` attempts of the co-evolution loop, stopping early on
//! Ctrl-C.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use frontier_forge::agents::{
    AgentConfig, LlmConsensusChecker, LlmSolver, LlmTaskGenerator, LlmUncertaintyEstimator,
    LlmVerifier,
};
use frontier_forge::coevolution::{CoEvolutionCoordinator, Collaborators, ForgeConfig};
use frontier_forge::curriculum::CurriculumScheduler;
use frontier_forge::error::CoordinatorError;
use frontier_forge::llm::{LiteLlmClient, LlmProvider};
use frontier_forge::metrics::init_metrics;
use frontier_forge::novelty::InMemoryNoveltyIndex;
use frontier_forge::reward::RewardEngine;
use frontier_forge::tools::{
    HttpGetTool, ShellTool, ToolCapability, ToolExecutionGraph, ToolRegistry,
};
use frontier_forge::utils::env::env_bool;

fn build_registry() -> anyhow::Result<ToolRegistry> {
    if !env_bool("FORGE_ALLOW_NETWORK")?.unwrap_or(false) {
        return Ok(ToolRegistry::with_default_tools());
    }
    let mut registry = ToolRegistry::new([
        ToolCapability::Compute,
        ToolCapability::Shell,
        ToolCapability::Network,
    ]);
    registry.register(Arc::new(ShellTool::new()))?;
    registry.register(Arc::new(HttpGetTool::new()))?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: RUST_LOG > FORGE_LOG_LEVEL > "info"
    let log_filter = std::env::var("FORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    init_metrics().context("failed to register metrics")?;

    let config = ForgeConfig::from_env().context("invalid configuration")?;
    let llm: Arc<dyn LlmProvider> =
        Arc::new(LiteLlmClient::from_env().context("LLM client not configured")?);

    let registry = Arc::new(build_registry()?);
    tracing::info!(tools = ?registry.list_tools(), "Tool registry ready");
    let graph = ToolExecutionGraph::new(registry).with_policy(config.coordinator.retry_policy());

    let mut collaborators = Collaborators::new(
        Arc::new(LlmTaskGenerator::with_defaults(llm.clone())),
        Arc::new(LlmSolver::new(llm.clone(), graph, AgentConfig::default())),
        Arc::new(LlmVerifier::with_defaults(llm.clone())),
        Arc::new(LlmUncertaintyEstimator::with_defaults(llm.clone())),
        Arc::new(InMemoryNoveltyIndex::default()),
    );
    if config.coordinator.self_verification {
        collaborators =
            collaborators.with_consensus(Arc::new(LlmConsensusChecker::with_defaults(llm)));
    }

    let scheduler = CurriculumScheduler::new(config.curriculum.clone())?;
    let reward = RewardEngine::new(config.reward);
    let max_attempts = config.max_attempts();
    let mut coordinator =
        CoEvolutionCoordinator::new(config.coordinator.clone(), scheduler, reward, collaborators)?;

    let shutdown = coordinator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current attempt");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    tracing::info!(
        max_attempts,
        log = %coordinator.log().path().display(),
        "Starting co-evolution loop"
    );

    match coordinator.run(max_attempts).await {
        Ok(summary) => {
            tracing::info!(
                attempts = summary.attempts,
                completed = summary.completed,
                success_rate = summary.success_rate(),
                mean_reward = summary.mean_reward(),
                "Run summary"
            );
        }
        Err(CoordinatorError::Interrupted) => {
            tracing::warn!("Run interrupted");
        }
        Err(e) => return Err(e.into()),
    }

    for tracker in coordinator.scheduler().trackers() {
        tracing::info!(
            domain = tracker.name(),
            difficulty = tracker.current_difficulty(),
            success_rate = tracker.success_rate(),
            attempts = tracker.total_attempts(),
            "Domain state"
        );
    }

    Ok(())
}
