//! The co-evolution loop: generate, solve, verify, reward, update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::collaborators::{
    BasicTaskValidator, ConsensusChecker, Solver, TaskGenerator, TaskValidator,
    UncertaintyEstimator, Verifier,
};
use super::config::CoordinatorConfig;
use super::rate_limit::RateLimiter;
use crate::attempt::{
    AttemptLog, AttemptOutcome, AttemptRecord, AttemptStage, FailureKind, SkipReason, TaskRequest,
    ATTEMPT_SCHEMA_VERSION,
};
use crate::curriculum::CurriculumScheduler;
use crate::error::{CollaboratorError, ConfigError, CoordinatorError, LlmError, PersistenceError};
use crate::metrics::MetricsCollector;
use crate::novelty::{novelty_key, NoveltyIndex};
use crate::reward::{RewardEngine, RewardInput};

/// The external collaborators a coordinator drives.
pub struct Collaborators {
    pub generator: Arc<dyn TaskGenerator>,
    pub validator: Arc<dyn TaskValidator>,
    pub solver: Arc<dyn Solver>,
    pub verifier: Arc<dyn Verifier>,
    pub estimator: Arc<dyn UncertaintyEstimator>,
    pub novelty: Arc<dyn NoveltyIndex>,
    pub consensus: Option<Arc<dyn ConsensusChecker>>,
}

impl Collaborators {
    /// Collaborators with [`BasicTaskValidator`] and no consensus checker.
    pub fn new(
        generator: Arc<dyn TaskGenerator>,
        solver: Arc<dyn Solver>,
        verifier: Arc<dyn Verifier>,
        estimator: Arc<dyn UncertaintyEstimator>,
        novelty: Arc<dyn NoveltyIndex>,
    ) -> Self {
        Self {
            generator,
            validator: Arc::new(BasicTaskValidator),
            solver,
            verifier,
            estimator,
            novelty,
            consensus: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn TaskValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_consensus(mut self, consensus: Arc<dyn ConsensusChecker>) -> Self {
        self.consensus = Some(consensus);
        self
    }
}

/// Totals over a [`CoEvolutionCoordinator::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub attempts: u64,
    pub completed: u64,
    pub successes: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_reward: f64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &AttemptOutcome) {
        self.attempts += 1;
        match outcome {
            AttemptOutcome::Completed(record) => {
                self.completed += 1;
                if record.success {
                    self.successes += 1;
                }
                self.total_reward += record.total_reward;
            }
            AttemptOutcome::Skipped(_) => self.skipped += 1,
            AttemptOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Mean reward over completed attempts.
    pub fn mean_reward(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_reward / self.completed as f64
        }
    }

    /// Success rate over completed attempts.
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.successes as f64 / self.completed as f64
        }
    }
}

/// Why an attempt stopped early.
enum Abort {
    Skip(SkipReason),
    Fail {
        stage: AttemptStage,
        kind: FailureKind,
        message: String,
    },
    Stop(CoordinatorError),
}

impl Abort {
    fn fail(stage: AttemptStage, kind: FailureKind, message: impl Into<String>) -> Self {
        Abort::Fail {
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// Classifies a collaborator error raised during `stage`.
fn abort_at(stage: AttemptStage) -> impl FnOnce(CollaboratorError) -> Abort {
    move |err| match err {
        CollaboratorError::Interrupted => Abort::Stop(CoordinatorError::Interrupted),
        CollaboratorError::Fatal(message) => Abort::Stop(CoordinatorError::Fatal {
            stage: stage.to_string(),
            message,
        }),
        CollaboratorError::Io(e) => Abort::fail(stage, FailureKind::Io, e.to_string()),
        CollaboratorError::Llm(LlmError::RequestFailed(message)) => {
            Abort::fail(stage, FailureKind::Io, message)
        }
        err @ (CollaboratorError::InvalidData(_)
        | CollaboratorError::Plan(_)
        | CollaboratorError::Llm(LlmError::ParseError(_))
        | CollaboratorError::Llm(LlmError::EmptyResponse)) => {
            Abort::fail(stage, FailureKind::InvalidData, err.to_string())
        }
        err @ (CollaboratorError::Llm(_) | CollaboratorError::Other(_)) => {
            Abort::fail(stage, FailureKind::Unexpected, err.to_string())
        }
    }
}

fn persistence_abort(err: PersistenceError) -> Abort {
    let kind = match err {
        PersistenceError::Io(_) => FailureKind::Io,
        PersistenceError::Serialization(_) => FailureKind::InvalidData,
        PersistenceError::LockTimeout { .. } => FailureKind::Unexpected,
    };
    Abort::fail(AttemptStage::Persist, kind, err.to_string())
}

/// Runs attempts one at a time and feeds outcomes back into the curriculum.
///
/// Only completed attempts update the scheduler. Rate-limited, rejected and
/// failed attempts come back as tagged [`AttemptOutcome`]s; interrupts and
/// fatal collaborator errors propagate as [`CoordinatorError`].
pub struct CoEvolutionCoordinator {
    config: CoordinatorConfig,
    scheduler: CurriculumScheduler,
    reward: RewardEngine,
    collaborators: Collaborators,
    limiter: RateLimiter,
    log: AttemptLog,
    shutdown: Arc<AtomicBool>,
    metrics: MetricsCollector,
}

impl CoEvolutionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        scheduler: CurriculumScheduler,
        reward: RewardEngine,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        reward.weights().validate()?;

        let limiter = RateLimiter::new(config.max_per_minute, config.max_per_hour);
        let log = config.attempt_log();
        Ok(Self {
            config,
            scheduler,
            reward,
            collaborators,
            limiter,
            log,
            shutdown: Arc::new(AtomicBool::new(false)),
            metrics: MetricsCollector::new(),
        })
    }

    /// Uses an externally owned shutdown flag.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Setting this flag makes the next `run_attempt` return
    /// [`CoordinatorError::Interrupted`].
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn scheduler(&self) -> &CurriculumScheduler {
        &self.scheduler
    }

    pub fn reward_engine(&self) -> &RewardEngine {
        &self.reward
    }

    pub fn log(&self) -> &AttemptLog {
        &self.log
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs one attempt.
    ///
    /// `overrides` is merged over the curriculum signal: `domain` and
    /// `difficulty` replace the signal's values, other keys are passed to the
    /// generator as parameters.
    pub async fn run_attempt(
        &mut self,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<AttemptOutcome, CoordinatorError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Interrupted);
        }

        if let Err(exceeded) = self.limiter.try_acquire() {
            warn!(
                window = %exceeded.window,
                limit = exceeded.limit,
                "Rate limit reached; skipping attempt"
            );
            self.metrics.record_rate_limited(exceeded.window.as_str());
            let outcome = AttemptOutcome::Skipped(SkipReason::RateLimited {
                window: exceeded.window,
                limit: exceeded.limit,
            });
            self.metrics.record_attempt(outcome.label(), "none", None);
            return Ok(outcome);
        }

        let signal_domain = self.scheduler.next_signal().domain;
        match self.attempt(overrides).await {
            Ok(record) => {
                self.scheduler.update(record.success, &record.domain);
                self.metrics.record_attempt(
                    if record.success { "success" } else { "failure" },
                    &record.domain,
                    Some(record.total_reward),
                );
                info!(
                    task_id = %record.task_id,
                    domain = %record.domain,
                    difficulty = record.difficulty,
                    success = record.success,
                    reward = record.total_reward,
                    duration_ms = record.duration_ms,
                    "Attempt completed"
                );
                Ok(AttemptOutcome::Completed(record))
            }
            Err(Abort::Skip(reason)) => {
                if let SkipReason::TaskRejected { issues } = &reason {
                    warn!(domain = %signal_domain, issues = ?issues, "Generated task rejected");
                }
                let outcome = AttemptOutcome::Skipped(reason);
                self.metrics
                    .record_attempt(outcome.label(), &signal_domain, None);
                Ok(outcome)
            }
            Err(Abort::Fail {
                stage,
                kind,
                message,
            }) => {
                warn!(
                    domain = %signal_domain,
                    stage = %stage,
                    kind = kind.as_str(),
                    error = %message,
                    "Attempt failed; curriculum not updated"
                );
                let outcome = AttemptOutcome::Failed {
                    stage,
                    kind,
                    message,
                };
                self.metrics
                    .record_attempt(outcome.label(), &signal_domain, None);
                Ok(outcome)
            }
            Err(Abort::Stop(err)) => {
                error!(error = %err, "Stopping coordinator");
                Err(err)
            }
        }
    }

    async fn attempt(
        &mut self,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<AttemptRecord, Abort> {
        let started = Instant::now();

        let signal = self.scheduler.next_signal();
        let mut request = TaskRequest::from_signal(&signal);
        if let Some(overrides) = overrides {
            request = request
                .with_overrides(overrides)
                .map_err(|message| Abort::fail(AttemptStage::Signal, FailureKind::InvalidData, message))?;
        }
        debug!(domain = %request.domain, difficulty = request.difficulty, "Requesting task");

        let c = &self.collaborators;

        let task = c
            .generator
            .generate(&request)
            .await
            .map_err(abort_at(AttemptStage::Generate))?;

        let validation = c
            .validator
            .validate(&request, &task)
            .await
            .map_err(abort_at(AttemptStage::Validate))?;
        if !validation.is_valid() {
            return Err(Abort::Skip(SkipReason::TaskRejected {
                issues: validation.issues(),
            }));
        }

        let solved = c
            .solver
            .solve(&task)
            .await
            .map_err(abort_at(AttemptStage::Solve))?;

        let verification = c
            .verifier
            .verify(&task, &solved.result)
            .await
            .map_err(abort_at(AttemptStage::Verify))?;
        let mut success = verification.status.is_pass();
        debug!(task_id = %task.id, status = verification.status.as_str(), detail = %verification.detail, "Verified result");

        let mut consensus_confidence = None;
        if self.config.self_verification {
            if let Some(checker) = &c.consensus {
                let consensus = checker
                    .check(&task, &solved.result)
                    .await
                    .map_err(abort_at(AttemptStage::SelfVerify))?;
                if success && !consensus.agreed {
                    info!(task_id = %task.id, confidence = consensus.confidence, "Self-verification vetoed a pass");
                    success = false;
                }
                consensus_confidence = Some(consensus.confidence.clamp(0.0, 1.0));
            }
        }

        let success_probability = c
            .estimator
            .estimate(&task.prompt, &solved.result)
            .await
            .map_err(abort_at(AttemptStage::Estimate))?;

        let key = novelty_key(&task.domain, &task.prompt);
        let vector = c
            .novelty
            .embed(&task.prompt)
            .await
            .map_err(abort_at(AttemptStage::Novelty))?;
        let similarity = c
            .novelty
            .max_similarity(&vector)
            .await
            .map_err(abort_at(AttemptStage::Novelty))?;
        c.novelty
            .add(vector)
            .await
            .map_err(abort_at(AttemptStage::Novelty))?;

        let mut breakdown = self.reward.score(RewardInput {
            tool_calls: &solved.tool_calls,
            success,
            success_probability,
            novelty_key: Some(&key),
            similarity: Some(similarity),
        });
        if let Some(confidence) = consensus_confidence {
            breakdown =
                breakdown.with_verification_bonus(self.config.verification_bonus_weight * confidence);
        }

        let record = AttemptRecord {
            schema_version: ATTEMPT_SCHEMA_VERSION,
            attempt_id: Uuid::new_v4(),
            task_id: task.id,
            domain: task.domain,
            difficulty: task.difficulty,
            prompt: task.prompt,
            tool_calls: solved.tool_calls,
            result: solved.result,
            success,
            verification_status: verification.status,
            success_probability: success_probability.clamp(0.0, 1.0),
            novelty_key: Some(key),
            similarity: Some(similarity),
            reward_breakdown: breakdown.to_map(),
            total_reward: breakdown.total,
            created_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let receipt = self.log.append(&record).await.map_err(persistence_abort)?;
        debug!(path = %receipt.path.display(), fallback = receipt.fallback, "Attempt persisted");

        Ok(record)
    }

    /// Runs up to `attempts` attempts. Interrupts and fatal errors stop the
    /// loop and propagate.
    pub async fn run(&mut self, attempts: u64) -> Result<RunSummary, CoordinatorError> {
        let mut summary = RunSummary::default();
        for _ in 0..attempts {
            let outcome = self.run_attempt(None).await?;
            summary.record(&outcome);
        }
        info!(
            attempts = summary.attempts,
            completed = summary.completed,
            successes = summary.successes,
            skipped = summary.skipped,
            failed = summary.failed,
            mean_reward = summary.mean_reward(),
            "Run finished"
        );
        Ok(summary)
    }
}
