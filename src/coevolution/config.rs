//! Coordinator and top-level configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::attempt::AttemptLog;
use crate::curriculum::CurriculumConfig;
use crate::error::ConfigError;
use crate::reward::RewardWeights;
use crate::tools::RetryPolicy;
use crate::utils::env::{env_bool, env_value};

/// Default number of attempts run by the binary.
pub const DEFAULT_MAX_ATTEMPTS: u64 = 10;

/// Configuration for [`super::CoEvolutionCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
    /// Path of the JSONL attempt log.
    pub log_path: PathBuf,
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    /// Retries per tool step for solvers that execute plans.
    pub tool_retries: u32,
    /// Ask the consensus checker to confirm passes.
    pub self_verification: bool,
    /// Multiplier of consensus confidence added to the reward.
    pub verification_bonus_weight: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 30,
            max_per_hour: 600,
            log_path: PathBuf::from("./attempts.jsonl"),
            lock_timeout: Duration::from_secs(5),
            lock_poll_interval: Duration::from_millis(50),
            tool_retries: 2,
            self_verification: false,
            verification_bonus_weight: 0.1,
        }
    }
}

impl CoordinatorConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_MAX_PER_MINUTE`: Attempts per minute (default: 30)
    /// - `FORGE_MAX_PER_HOUR`: Attempts per hour (default: 600)
    /// - `FORGE_ATTEMPT_LOG`: Attempt log path (default: ./attempts.jsonl)
    /// - `FORGE_LOCK_TIMEOUT_MS`: Log lock wait (default: 5000)
    /// - `FORGE_LOCK_POLL_MS`: Log lock poll interval (default: 50)
    /// - `FORGE_TOOL_RETRIES`: Retries per tool step (default: 2)
    /// - `FORGE_SELF_VERIFICATION`: Enable consensus self-verification (default: false)
    /// - `FORGE_VERIFICATION_BONUS_WEIGHT`: Bonus per unit of consensus confidence (default: 0.1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = env_value("FORGE_MAX_PER_MINUTE")? {
            config.max_per_minute = val;
        }
        if let Some(val) = env_value("FORGE_MAX_PER_HOUR")? {
            config.max_per_hour = val;
        }
        if let Ok(val) = std::env::var("FORGE_ATTEMPT_LOG") {
            config.log_path = PathBuf::from(val);
        }
        if let Some(ms) = env_value::<u64>("FORGE_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("FORGE_LOCK_POLL_MS")? {
            config.lock_poll_interval = Duration::from_millis(ms);
        }
        if let Some(val) = env_value("FORGE_TOOL_RETRIES")? {
            config.tool_retries = val;
        }
        if let Some(val) = env_bool("FORGE_SELF_VERIFICATION")? {
            config.self_verification = val;
        }
        if let Some(val) = env_value("FORGE_VERIFICATION_BONUS_WEIGHT")? {
            config.verification_bonus_weight = val;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_minute == 0 || self.max_per_hour == 0 {
            return Err(ConfigError::ValidationFailed(
                "rate limits must be greater than 0".to_string(),
            ));
        }
        if self.max_per_minute > self.max_per_hour {
            return Err(ConfigError::ValidationFailed(format!(
                "max_per_minute ({}) cannot exceed max_per_hour ({})",
                self.max_per_minute, self.max_per_hour
            )));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "log_path cannot be empty".to_string(),
            ));
        }
        if self.lock_poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "lock_poll_interval must be greater than 0".to_string(),
            ));
        }
        if !self.verification_bonus_weight.is_finite() || self.verification_bonus_weight < 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "verification_bonus_weight must be non-negative, got {}",
                self.verification_bonus_weight
            )));
        }
        Ok(())
    }

    pub fn with_rate_limits(mut self, per_minute: u32, per_hour: u32) -> Self {
        self.max_per_minute = per_minute;
        self.max_per_hour = per_hour;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_self_verification(mut self, enabled: bool) -> Self {
        self.self_verification = enabled;
        self
    }

    pub fn with_verification_bonus_weight(mut self, weight: f64) -> Self {
        self.verification_bonus_weight = weight;
        self
    }

    /// The attempt log described by this configuration.
    pub fn attempt_log(&self) -> AttemptLog {
        AttemptLog::new(self.log_path.clone())
            .with_lock_timeout(self.lock_timeout)
            .with_poll_interval(self.lock_poll_interval)
    }

    /// Retry policy for tool plans.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.tool_retries)
    }
}

/// Everything the binary needs, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ForgeConfig {
    pub curriculum: CurriculumConfig,
    pub reward: RewardWeights,
    pub coordinator: CoordinatorConfig,
    /// `FORGE_MAX_ATTEMPTS`, default 10.
    pub max_attempts: Option<u64>,
}

impl ForgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let curriculum = CurriculumConfig::from_env()?;
        let mut reward = RewardWeights::from_env()?;
        // One target drives both the curriculum and reward calibration.
        reward.target_success_rate = curriculum.target_success_rate;

        Ok(Self {
            curriculum,
            reward,
            coordinator: CoordinatorConfig::from_env()?,
            max_attempts: env_value("FORGE_MAX_ATTEMPTS")?,
        })
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_per_minute, 30);
        assert_eq!(config.max_per_hour, 600);
        assert_eq!(config.retry_policy().max_retries, 2);
        assert_eq!(ForgeConfig::default().max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_validation() {
        assert!(CoordinatorConfig::default()
            .with_rate_limits(0, 10)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_rate_limits(50, 10)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_verification_bonus_weight(-0.5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_attempt_log_paths() {
        let config = CoordinatorConfig::default().with_log_path("/tmp/forge/attempts.jsonl");
        let log = config.attempt_log();
        assert_eq!(log.path(), std::path::Path::new("/tmp/forge/attempts.jsonl"));
        assert_eq!(
            log.lock_path(),
            std::path::Path::new("/tmp/forge/attempts.jsonl.lock")
        );
    }
}
