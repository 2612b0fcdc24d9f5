//! Frontier-seeking selection of the active domain.

use std::collections::BTreeMap;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::CurriculumConfig;
use super::tracker::{DomainDifficultyTracker, DomainState};
use crate::error::ConfigError;
use crate::metrics::MetricsCollector;

/// Smoothing factor for the global success-rate EMA.
pub const GLOBAL_EMA_ALPHA: f64 = 0.1;

const INITIAL_GLOBAL_SUCCESS_RATE: f64 = 0.5;

/// What the scheduler asks the task generator for next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultySignal {
    pub domain: String,
    pub difficulty: f64,
}

/// Owned, serializable scheduler state.
///
/// Captured with [`CurriculumScheduler::snapshot`] and restored with
/// [`CurriculumScheduler::from_state`], so several schedulers can live side by
/// side (tests, workers) without hidden globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub step: u64,
    pub global_success_rate: f64,
    pub active_domain: String,
    pub domains: BTreeMap<String, DomainState>,
    #[serde(default)]
    pub unknown_domain_updates: u64,
}

/// Keeps the agent working where its success rate sits near the target.
///
/// Every `reselect_interval` updates the active domain becomes the one whose
/// windowed success rate is closest to the target; with probability
/// `exploration_probability` the second-closest is taken instead. With
/// frontier selection disabled the domains are visited round-robin.
pub struct CurriculumScheduler {
    config: CurriculumConfig,
    trackers: Vec<DomainDifficultyTracker>,
    active: usize,
    step: u64,
    global_success_rate: f64,
    unknown_domain_updates: u64,
    rng: ChaCha8Rng,
    metrics: MetricsCollector,
}

impl CurriculumScheduler {
    /// Creates a scheduler with one fresh tracker per configured domain.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn new(config: CurriculumConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let trackers = config
            .domains
            .iter()
            .map(|name| {
                DomainDifficultyTracker::new(
                    name.clone(),
                    config.target_success_rate,
                    config.frontier_window,
                    config.initial_difficulty,
                )
            })
            .collect();

        let rng = create_rng(config.seed);
        let scheduler = Self {
            config,
            trackers,
            active: 0,
            step: 0,
            global_success_rate: INITIAL_GLOBAL_SUCCESS_RATE,
            unknown_domain_updates: 0,
            rng,
            metrics: MetricsCollector::new(),
        };
        scheduler.publish_domain_metrics();
        Ok(scheduler)
    }

    /// Restores a scheduler from a snapshot.
    ///
    /// Configured domains missing from the snapshot start fresh; snapshot
    /// domains no longer configured are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the snapshot's
    /// active domain is not configured.
    pub fn from_state(config: CurriculumConfig, state: SchedulerState) -> Result<Self, ConfigError> {
        let mut scheduler = Self::new(config)?;

        let active = scheduler
            .index_of(&state.active_domain)
            .ok_or_else(|| {
                ConfigError::ValidationFailed(format!(
                    "snapshot active domain '{}' is not configured",
                    state.active_domain
                ))
            })?;

        let SchedulerState {
            step,
            global_success_rate,
            domains,
            unknown_domain_updates,
            ..
        } = state;

        for (name, domain_state) in domains {
            match scheduler.index_of(&name) {
                Some(idx) => {
                    scheduler.trackers[idx] = DomainDifficultyTracker::from_state(
                        name,
                        scheduler.config.target_success_rate,
                        scheduler.config.frontier_window,
                        scheduler.config.initial_difficulty,
                        domain_state,
                    );
                }
                None => warn!(domain = %name, "Dropping snapshot state for unconfigured domain"),
            }
        }

        scheduler.active = active;
        scheduler.step = step;
        scheduler.global_success_rate = global_success_rate.clamp(0.0, 1.0);
        scheduler.unknown_domain_updates = unknown_domain_updates;
        scheduler.publish_domain_metrics();
        Ok(scheduler)
    }

    /// Returns the active domain and its current difficulty. Pure read.
    pub fn next_signal(&self) -> DifficultySignal {
        let tracker = &self.trackers[self.active];
        DifficultySignal {
            domain: tracker.name().to_string(),
            difficulty: tracker.current_difficulty(),
        }
    }

    /// Records the outcome of a completed attempt.
    ///
    /// The step counter and global EMA always advance. An unrecognised domain
    /// leaves every tracker untouched and is only counted.
    pub fn update(&mut self, success: bool, domain: &str) {
        self.step += 1;
        let outcome = if success { 1.0 } else { 0.0 };
        self.global_success_rate =
            (1.0 - GLOBAL_EMA_ALPHA) * self.global_success_rate + GLOBAL_EMA_ALPHA * outcome;

        match self.index_of(domain) {
            Some(idx) => {
                let tracker = &mut self.trackers[idx];
                let change = tracker.update(success);
                debug!(
                    domain = domain,
                    success = success,
                    success_rate = tracker.success_rate(),
                    difficulty = tracker.current_difficulty(),
                    change = ?change,
                    "Domain updated"
                );
                self.metrics.record_domain_state(
                    domain,
                    tracker.current_difficulty(),
                    tracker.success_rate(),
                );
            }
            None => {
                self.unknown_domain_updates += 1;
                self.metrics.record_unknown_domain(domain);
                warn!(
                    domain = domain,
                    total = self.unknown_domain_updates,
                    "Ignoring outcome for unknown domain"
                );
            }
        }

        if self.step % self.config.reselect_interval == 0 {
            self.reselect();
        }
    }

    fn reselect(&mut self) {
        let previous = self.active;

        self.active = if self.config.frontier_selection {
            self.select_frontier_domain()
        } else {
            (self.active + 1) % self.trackers.len()
        };

        if self.active != previous {
            info!(
                step = self.step,
                from = self.trackers[previous].name(),
                to = self.trackers[self.active].name(),
                "Active domain switched"
            );
        }
    }

    /// Index of the domain closest to the frontier, or the runner-up when exploring.
    fn select_frontier_domain(&mut self) -> usize {
        let mut ranked: Vec<(usize, f64)> = self
            .trackers
            .iter()
            .enumerate()
            .map(|(idx, tracker)| (idx, tracker.frontier_distance()))
            .collect();
        // Stable sort keeps configured order on ties.
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        if ranked.len() >= 2 && self.rng.random_bool(self.config.exploration_probability) {
            debug!(domain = self.trackers[ranked[1].0].name(), "Exploring second-closest domain");
            return ranked[1].0;
        }
        ranked[0].0
    }

    fn index_of(&self, domain: &str) -> Option<usize> {
        self.trackers.iter().position(|t| t.name() == domain)
    }

    fn publish_domain_metrics(&self) {
        for tracker in &self.trackers {
            self.metrics.record_domain_state(
                tracker.name(),
                tracker.current_difficulty(),
                tracker.success_rate(),
            );
        }
    }

    /// Captures the full scheduler state.
    pub fn snapshot(&self) -> SchedulerState {
        SchedulerState {
            step: self.step,
            global_success_rate: self.global_success_rate,
            active_domain: self.active_domain().to_string(),
            domains: self
                .trackers
                .iter()
                .map(|t| (t.name().to_string(), t.state().clone()))
                .collect(),
            unknown_domain_updates: self.unknown_domain_updates,
        }
    }

    /// Returns to construction-time state. The exploration RNG is reseeded.
    pub fn reset(&mut self) {
        for tracker in &mut self.trackers {
            tracker.reset();
        }
        self.active = 0;
        self.step = 0;
        self.global_success_rate = INITIAL_GLOBAL_SUCCESS_RATE;
        self.unknown_domain_updates = 0;
        self.rng = create_rng(self.config.seed);
        self.publish_domain_metrics();
    }

    pub fn active_domain(&self) -> &str {
        self.trackers[self.active].name()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn global_success_rate(&self) -> f64 {
        self.global_success_rate
    }

    pub fn unknown_domain_updates(&self) -> u64 {
        self.unknown_domain_updates
    }

    pub fn tracker(&self, domain: &str) -> Option<&DomainDifficultyTracker> {
        self.index_of(domain).map(|idx| &self.trackers[idx])
    }

    pub fn trackers(&self) -> impl Iterator<Item = &DomainDifficultyTracker> {
        self.trackers.iter()
    }

    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_config() -> CurriculumConfig {
        CurriculumConfig::new(["math", "code", "logic"])
            .with_exploration_probability(0.0)
            .with_seed(7)
    }

    #[test]
    fn test_initial_signal() {
        let scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        let signal = scheduler.next_signal();
        assert_eq!(signal.domain, "math");
        assert_eq!(signal.difficulty, 0.3);
        assert_eq!(scheduler.step(), 0);
        assert_eq!(scheduler.global_success_rate(), 0.5);
    }

    #[test]
    fn test_next_signal_is_pure() {
        let scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        assert_eq!(scheduler.next_signal(), scheduler.next_signal());
        assert_eq!(scheduler.step(), 0);
    }

    #[test]
    fn test_global_success_rate_is_ema() {
        let mut scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        scheduler.update(true, "math");
        assert!((scheduler.global_success_rate() - 0.55).abs() < 1e-12);
        scheduler.update(false, "math");
        assert!((scheduler.global_success_rate() - 0.495).abs() < 1e-12);
    }

    #[test]
    fn test_frontier_selection_picks_closest_domain() {
        let mut scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");

        // math: 3/3 successes -> distance 0.5; the untouched domains sit at 0.5 -> distance 0.0
        scheduler.update(true, "math");
        scheduler.update(true, "math");
        scheduler.update(true, "math");
        assert_eq!(scheduler.active_domain(), "code");

        // code back at 0.5 -> distance 0.0; logic at 0/1 -> distance 0.5
        scheduler.update(true, "code");
        scheduler.update(false, "code");
        scheduler.update(false, "logic");
        assert_eq!(scheduler.active_domain(), "code");
    }

    #[test]
    fn test_frontier_selection_is_deterministic_for_fixed_history() {
        let history = [
            (true, "math"),
            (false, "code"),
            (true, "logic"),
            (true, "logic"),
            (false, "math"),
            (true, "code"),
        ];

        let mut a = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        let mut b = CurriculumScheduler::new(deterministic_config().with_seed(99))
            .expect("valid config");
        for (success, domain) in history {
            a.update(success, domain);
            b.update(success, domain);
        }
        assert_eq!(a.active_domain(), b.active_domain());
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_forced_exploration_picks_second_closest() {
        let config = deterministic_config().with_exploration_probability(1.0);
        let mut scheduler = CurriculumScheduler::new(config).expect("valid config");

        // math far from target, code and logic tied at the frontier
        scheduler.update(true, "math");
        scheduler.update(true, "math");
        scheduler.update(true, "math");
        // closest is code (first on tie), second-closest is logic
        assert_eq!(scheduler.active_domain(), "logic");
    }

    #[test]
    fn test_single_domain_never_explores() {
        let config = CurriculumConfig::new(["math"])
            .with_exploration_probability(1.0)
            .with_seed(1);
        let mut scheduler = CurriculumScheduler::new(config).expect("valid config");
        for _ in 0..6 {
            scheduler.update(true, "math");
        }
        assert_eq!(scheduler.active_domain(), "math");
    }

    #[test]
    fn test_round_robin_when_frontier_disabled() {
        let config = deterministic_config().with_frontier_selection(false);
        let mut scheduler = CurriculumScheduler::new(config).expect("valid config");

        let mut visited = Vec::new();
        for _ in 0..9 {
            scheduler.update(true, "math");
            visited.push(scheduler.active_domain().to_string());
        }
        assert_eq!(
            visited,
            vec!["math", "math", "code", "code", "code", "logic", "logic", "logic", "math"]
        );
    }

    #[test]
    fn test_unknown_domain_is_counted_not_routed() {
        let mut scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        let before = scheduler.snapshot().domains;

        scheduler.update(true, "chemistry");

        assert_eq!(scheduler.unknown_domain_updates(), 1);
        assert_eq!(scheduler.snapshot().domains, before);
        assert_eq!(scheduler.step(), 1);
    }

    #[test]
    fn test_scenario_math_successes_plateau() {
        let config = CurriculumConfig::new(["math"])
            .with_target_success_rate(0.5)
            .with_frontier_window(0.1)
            .with_initial_difficulty(0.3)
            .with_seed(3);
        let mut scheduler = CurriculumScheduler::new(config).expect("valid config");

        let mut difficulties = Vec::new();
        for _ in 0..20 {
            scheduler.update(true, "math");
            difficulties.push(scheduler.next_signal().difficulty);
        }

        let first_max = difficulties
            .iter()
            .position(|&d| d == 1.0)
            .expect("difficulty should reach 1.0");
        assert!(first_max < 19);
        assert!(difficulties[first_max..].iter().all(|&d| d == 1.0));
        for pair in difficulties[..=first_max].windows(2) {
            assert!((pair[1] - pair[0] - 0.05).abs() < 1e-9);
        }
    }

    #[test]
    fn test_snapshot_round_trip_and_reset() {
        let mut scheduler = CurriculumScheduler::new(deterministic_config()).expect("valid config");
        for _ in 0..4 {
            scheduler.update(true, "math");
        }
        scheduler.update(false, "nope");

        let snapshot = scheduler.snapshot();
        let json = serde_json::to_string(&snapshot).expect("serializes");
        let decoded: SchedulerState = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(decoded.active_domain, snapshot.active_domain);
        assert_eq!(decoded.step, 5);
        assert_eq!(decoded.unknown_domain_updates, 1);

        let restored = CurriculumScheduler::from_state(deterministic_config(), snapshot.clone())
            .expect("restores");

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.next_signal(), scheduler.next_signal());

        scheduler.reset();
        assert_eq!(scheduler.step(), 0);
        assert_eq!(scheduler.active_domain(), "math");
        assert_eq!(scheduler.unknown_domain_updates(), 0);
        assert_eq!(scheduler.next_signal().difficulty, 0.3);
    }

    #[test]
    fn test_from_state_rejects_unknown_active_domain() {
        let mut state = CurriculumScheduler::new(deterministic_config())
            .expect("valid config")
            .snapshot();
        state.active_domain = "history".to_string();
        assert!(CurriculumScheduler::from_state(deterministic_config(), state).is_err());
    }
}
