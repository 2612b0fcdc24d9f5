//! Curriculum scheduler configuration.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::utils::env::{env_bool, env_value};

/// Configuration for the curriculum scheduler.
#[derive(Debug, Clone)]
pub struct CurriculumConfig {
    /// Supported task domains, in selection order. The first one starts active.
    pub domains: Vec<String>,
    /// Success rate the scheduler steers toward.
    pub target_success_rate: f64,
    /// Tolerance band around the target inside which difficulty holds.
    pub frontier_window: f64,
    /// Starting difficulty for every domain.
    pub initial_difficulty: f64,
    /// Number of updates between active-domain reselections.
    pub reselect_interval: u64,
    /// Probability of picking the second-closest domain on reselection.
    pub exploration_probability: f64,
    /// Frontier selection when true, cyclic round-robin when false.
    pub frontier_selection: bool,
    /// Seed for exploration draws; OS-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            domains: vec!["math".to_string(), "code".to_string(), "logic".to_string()],
            target_success_rate: 0.5,
            frontier_window: 0.1,
            initial_difficulty: 0.3,
            reselect_interval: 3,
            exploration_probability: 0.2,
            frontier_selection: true,
            seed: None,
        }
    }
}

impl CurriculumConfig {
    /// Creates a configuration for the given domains with default tuning.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_DOMAINS`: Comma-separated domain names (default: math,code,logic)
    /// - `FORGE_TARGET_SUCCESS_RATE`: Target success rate (default: 0.5)
    /// - `FORGE_FRONTIER_WINDOW`: Tolerance band (default: 0.1)
    /// - `FORGE_INITIAL_DIFFICULTY`: Starting difficulty (default: 0.3)
    /// - `FORGE_RESELECT_INTERVAL`: Updates between reselections (default: 3)
    /// - `FORGE_EXPLORATION_PROBABILITY`: Second-closest pick probability (default: 0.2)
    /// - `FORGE_FRONTIER_SELECTION`: Enable frontier selection (default: true)
    /// - `FORGE_SEED`: Seed for exploration draws (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FORGE_DOMAINS") {
            config.domains = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(val) = env_value("FORGE_TARGET_SUCCESS_RATE")? {
            config.target_success_rate = val;
        }
        if let Some(val) = env_value("FORGE_FRONTIER_WINDOW")? {
            config.frontier_window = val;
        }
        if let Some(val) = env_value("FORGE_INITIAL_DIFFICULTY")? {
            config.initial_difficulty = val;
        }
        if let Some(val) = env_value("FORGE_RESELECT_INTERVAL")? {
            config.reselect_interval = val;
        }
        if let Some(val) = env_value("FORGE_EXPLORATION_PROBABILITY")? {
            config.exploration_probability = val;
        }
        if let Some(val) = env_bool("FORGE_FRONTIER_SELECTION")? {
            config.frontier_selection = val;
        }
        config.seed = env_value("FORGE_SEED")?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one domain is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            if domain.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "domain names cannot be empty".to_string(),
                ));
            }
            if !seen.insert(domain.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "domain '{}' is listed more than once",
                    domain
                )));
            }
        }

        for (name, value) in [
            ("target_success_rate", self.target_success_rate),
            ("frontier_window", self.frontier_window),
            ("initial_difficulty", self.initial_difficulty),
            ("exploration_probability", self.exploration_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.reselect_interval == 0 {
            return Err(ConfigError::ValidationFailed(
                "reselect_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_target_success_rate(mut self, target: f64) -> Self {
        self.target_success_rate = target;
        self
    }

    pub fn with_frontier_window(mut self, window: f64) -> Self {
        self.frontier_window = window;
        self
    }

    pub fn with_initial_difficulty(mut self, difficulty: f64) -> Self {
        self.initial_difficulty = difficulty;
        self
    }

    pub fn with_reselect_interval(mut self, interval: u64) -> Self {
        self.reselect_interval = interval;
        self
    }

    pub fn with_exploration_probability(mut self, probability: f64) -> Self {
        self.exploration_probability = probability;
        self
    }

    pub fn with_frontier_selection(mut self, enabled: bool) -> Self {
        self.frontier_selection = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
