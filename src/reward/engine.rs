//! Multi-component attempt scoring.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::attempt::ToolCallRecord;
use crate::error::ConfigError;
use crate::tools::ToolStatus;
use crate::utils::env::env_value;

/// Number of novelty keys remembered for duplicate detection.
pub const NOVELTY_MEMORY: usize = 100;

/// Fixed weight of the correctness component.
pub const CORRECTNESS_WEIGHT: f64 = 0.3;

const NO_TOOL_PENALTY: f64 = -0.2;
const TOOL_CALL_CREDIT: f64 = 0.1;
const TOOL_USE_CAP: f64 = 1.0;
const DUPLICATE_KEY_PENALTY: f64 = -1.0;
const SIMILARITY_PENALTY: f64 = -0.5;
const CORRECT_REWARD: f64 = 1.0;
const INCORRECT_REWARD: f64 = -0.5;

/// Read-only weights and thresholds for [`RewardEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub uncertainty_weight: f64,
    pub tool_use_weight: f64,
    pub novelty_weight: f64,
    /// Calibration target for the success-probability estimate.
    pub target_success_rate: f64,
    /// Similarity above which a task counts as a near duplicate.
    pub similarity_threshold: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            uncertainty_weight: 1.0,
            tool_use_weight: 0.5,
            novelty_weight: 0.5,
            target_success_rate: 0.5,
            similarity_threshold: 0.9,
        }
    }
}

impl RewardWeights {
    /// Reads overrides from `FORGE_UNCERTAINTY_WEIGHT`, `FORGE_TOOL_USE_WEIGHT`,
    /// `FORGE_NOVELTY_WEIGHT`, `FORGE_TARGET_SUCCESS_RATE` and
    /// `FORGE_SIMILARITY_THRESHOLD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut weights = Self::default();
        if let Some(val) = env_value("FORGE_UNCERTAINTY_WEIGHT")? {
            weights.uncertainty_weight = val;
        }
        if let Some(val) = env_value("FORGE_TOOL_USE_WEIGHT")? {
            weights.tool_use_weight = val;
        }
        if let Some(val) = env_value("FORGE_NOVELTY_WEIGHT")? {
            weights.novelty_weight = val;
        }
        if let Some(val) = env_value("FORGE_TARGET_SUCCESS_RATE")? {
            weights.target_success_rate = val;
        }
        if let Some(val) = env_value("FORGE_SIMILARITY_THRESHOLD")? {
            weights.similarity_threshold = val;
        }
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("uncertainty_weight", self.uncertainty_weight),
            ("tool_use_weight", self.tool_use_weight),
            ("novelty_weight", self.novelty_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("target_success_rate", self.target_success_rate),
            ("similarity_threshold", self.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn with_target_success_rate(mut self, target: f64) -> Self {
        self.target_success_rate = target;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Everything the engine needs to score one attempt.
#[derive(Debug, Clone, Copy)]
pub struct RewardInput<'a> {
    pub tool_calls: &'a [ToolCallRecord],
    pub success: bool,
    /// Externally estimated probability that the solver succeeds.
    pub success_probability: f64,
    pub novelty_key: Option<&'a str>,
    pub similarity: Option<f64>,
}

/// Per-component scores and the weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub uncertainty: f64,
    pub tool_use: f64,
    pub novelty: f64,
    pub correctness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_bonus: Option<f64>,
    pub total: f64,
}

impl RewardBreakdown {
    /// Adds a verification-confidence bonus to the total.
    pub fn with_verification_bonus(mut self, bonus: f64) -> Self {
        self.total += bonus;
        self.verification_bonus = Some(self.verification_bonus.unwrap_or(0.0) + bonus);
        self
    }

    /// Components by name, as stored on attempt records.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("uncertainty".to_string(), self.uncertainty);
        map.insert("tool_use".to_string(), self.tool_use);
        map.insert("novelty".to_string(), self.novelty);
        map.insert("correctness".to_string(), self.correctness);
        if let Some(bonus) = self.verification_bonus {
            map.insert("verification_bonus".to_string(), bonus);
        }
        map.insert("total".to_string(), self.total);
        map
    }
}

/// Scores attempts and remembers recent novelty keys.
#[derive(Debug, Clone)]
pub struct RewardEngine {
    weights: RewardWeights,
    seen: VecDeque<String>,
}

impl RewardEngine {
    pub fn new(weights: RewardWeights) -> Self {
        Self {
            weights,
            seen: VecDeque::with_capacity(NOVELTY_MEMORY),
        }
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Scores an attempt. Records `novelty_key` so a repeat is penalised.
    pub fn score(&mut self, input: RewardInput<'_>) -> RewardBreakdown {
        let probability = input.success_probability.clamp(0.0, 1.0);
        let uncertainty = -(probability - self.weights.target_success_rate).abs();

        let tool_use = if input.tool_calls.is_empty() {
            NO_TOOL_PENALTY
        } else {
            let ok = input
                .tool_calls
                .iter()
                .filter(|c| c.status == ToolStatus::Ok)
                .count();
            (TOOL_CALL_CREDIT * ok as f64).min(TOOL_USE_CAP)
        };

        let mut novelty = 0.0;
        if let Some(key) = input.novelty_key {
            if self.seen.iter().any(|k| k == key) {
                novelty += DUPLICATE_KEY_PENALTY;
            }
            self.remember(key);
        }
        // Stacks with the key penalty.
        if let Some(similarity) = input.similarity {
            if similarity > self.weights.similarity_threshold {
                novelty += SIMILARITY_PENALTY;
            }
        }

        let correctness = if input.success {
            CORRECT_REWARD
        } else {
            INCORRECT_REWARD
        };

        let total = self.weights.uncertainty_weight * uncertainty
            + self.weights.tool_use_weight * tool_use
            + self.weights.novelty_weight * novelty
            + CORRECTNESS_WEIGHT * correctness;

        tracing::trace!(uncertainty, tool_use, novelty, correctness, total, "Scored attempt");

        RewardBreakdown {
            uncertainty,
            tool_use,
            novelty,
            correctness,
            verification_bonus: None,
            total,
        }
    }

    fn remember(&mut self, key: &str) {
        if self.seen.len() == NOVELTY_MEMORY {
            self.seen.pop_front();
        }
        self.seen.push_back(key.to_string());
    }

    /// Number of remembered novelty keys.
    pub fn seen_keys(&self) -> usize {
        self.seen.len()
    }

    /// Forgets every novelty key.
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}
