//! Self-verification by majority vote of independent judgements.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentConfig, LlmVerifier};
use crate::attempt::Task;
use crate::coevolution::{Consensus, ConsensusChecker, Verifier};
use crate::error::CollaboratorError;
use crate::llm::LlmProvider;

pub const DEFAULT_JUDGES: usize = 3;

/// Polls a judge model several times at a sampling temperature and takes a
/// strict majority of passes.
///
/// A judgement that fails with a recoverable error counts as an abstention
/// (not a pass). If every judgement fails, the last error is returned.
#[derive(Debug)]
pub struct LlmConsensusChecker {
    judge: LlmVerifier,
    judges: usize,
}

impl LlmConsensusChecker {
    pub const AGENT_NAME: &'static str = "consensus";

    pub fn new(llm: Arc<dyn LlmProvider>, config: AgentConfig, judges: usize) -> Self {
        Self {
            judge: LlmVerifier::new(llm, config),
            judges: judges.max(1),
        }
    }

    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            llm,
            AgentConfig::default().with_temperature(0.7),
            DEFAULT_JUDGES,
        )
    }

    pub fn judges(&self) -> usize {
        self.judges
    }
}

#[async_trait]
impl ConsensusChecker for LlmConsensusChecker {
    async fn check(&self, task: &Task, result: &str) -> Result<Consensus, CollaboratorError> {
        let mut passes = 0usize;
        let mut errors = 0usize;
        let mut last_error = None;

        for judge in 0..self.judges {
            match self.judge.verify(task, result).await {
                Ok(verification) if verification.status.is_pass() => passes += 1,
                Ok(_) => {}
                Err(e @ (CollaboratorError::Interrupted | CollaboratorError::Fatal(_))) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task.id,
                        judge,
                        error = %e,
                        "Judgement failed, counting as abstention"
                    );
                    errors += 1;
                    last_error = Some(e);
                }
            }
        }

        if errors == self.judges {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let consensus = Consensus {
            agreed: passes * 2 > self.judges,
            confidence: passes as f64 / self.judges as f64,
        };
        tracing::debug!(
            task_id = %task.id,
            passes,
            judges = self.judges,
            agreed = consensus.agreed,
            "Consensus reached"
        );
        Ok(consensus)
    }
}
