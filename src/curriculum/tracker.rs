//! Windowed success tracking and difficulty adjustment for a single domain.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of recent outcomes kept per domain.
pub const OUTCOME_WINDOW: usize = 20;

/// Amount the difficulty moves per adjustment.
pub const DIFFICULTY_STEP: f64 = 0.05;

/// Success rate reported before any outcome has been observed.
const INITIAL_SUCCESS_RATE: f64 = 0.5;

/// Serializable per-domain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    /// Mean of `recent_outcomes`.
    pub success_rate: f64,
    /// Current difficulty in [0, 1].
    pub difficulty: f64,
    /// Outcomes observed since creation (not bounded by the window).
    pub total_attempts: u64,
    /// Most recent outcomes, oldest first.
    pub recent_outcomes: VecDeque<bool>,
}

impl DomainState {
    fn new(initial_difficulty: f64) -> Self {
        Self {
            success_rate: INITIAL_SUCCESS_RATE,
            difficulty: snap(initial_difficulty.clamp(0.0, 1.0)),
            total_attempts: 0,
            recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
        }
    }
}

/// Direction of a difficulty adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyChange {
    Raised,
    Lowered,
    Unchanged,
}

/// Tracks recent outcomes for one domain and nudges its difficulty toward the frontier.
///
/// Difficulty rises by [`DIFFICULTY_STEP`] while the windowed success rate is
/// above `target + window`, falls while it is below `target - window`, and
/// holds inside the band.
#[derive(Debug, Clone)]
pub struct DomainDifficultyTracker {
    name: String,
    target_success_rate: f64,
    frontier_window: f64,
    initial_difficulty: f64,
    state: DomainState,
}

impl DomainDifficultyTracker {
    /// Creates a tracker with an empty outcome window.
    pub fn new(
        name: impl Into<String>,
        target_success_rate: f64,
        frontier_window: f64,
        initial_difficulty: f64,
    ) -> Self {
        Self {
            name: name.into(),
            target_success_rate,
            frontier_window,
            initial_difficulty,
            state: DomainState::new(initial_difficulty),
        }
    }

    /// Restores a tracker from a previously captured state.
    ///
    /// The window is trimmed to [`OUTCOME_WINDOW`] and the success rate is
    /// recomputed from it, so a hand-edited state cannot break the invariant.
    pub fn from_state(
        name: impl Into<String>,
        target_success_rate: f64,
        frontier_window: f64,
        initial_difficulty: f64,
        mut state: DomainState,
    ) -> Self {
        while state.recent_outcomes.len() > OUTCOME_WINDOW {
            state.recent_outcomes.pop_front();
        }
        state.difficulty = snap(state.difficulty.clamp(0.0, 1.0));
        state.success_rate = window_mean(&state.recent_outcomes);

        Self {
            name: name.into(),
            target_success_rate,
            frontier_window,
            initial_difficulty,
            state,
        }
    }

    /// Records one outcome and adjusts the difficulty.
    pub fn update(&mut self, success: bool) -> DifficultyChange {
        if self.state.recent_outcomes.len() == OUTCOME_WINDOW {
            self.state.recent_outcomes.pop_front();
        }
        self.state.recent_outcomes.push_back(success);
        self.state.total_attempts += 1;
        self.state.success_rate = window_mean(&self.state.recent_outcomes);

        let upper = self.target_success_rate + self.frontier_window;
        let lower = self.target_success_rate - self.frontier_window;
        let before = self.state.difficulty;

        if self.state.success_rate > upper {
            self.state.difficulty = snap((before + DIFFICULTY_STEP).min(1.0));
        } else if self.state.success_rate < lower {
            self.state.difficulty = snap((before - DIFFICULTY_STEP).max(0.0));
        }

        if self.state.difficulty > before {
            DifficultyChange::Raised
        } else if self.state.difficulty < before {
            DifficultyChange::Lowered
        } else {
            DifficultyChange::Unchanged
        }
    }

    /// Current difficulty in [0, 1].
    pub fn current_difficulty(&self) -> f64 {
        self.state.difficulty
    }

    pub fn success_rate(&self) -> f64 {
        self.state.success_rate
    }

    pub fn total_attempts(&self) -> u64 {
        self.state.total_attempts
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &DomainState {
        &self.state
    }

    /// Distance between the windowed success rate and the target.
    pub fn frontier_distance(&self) -> f64 {
        (self.state.success_rate - self.target_success_rate).abs()
    }

    /// Drops all history and returns to the initial difficulty.
    pub fn reset(&mut self) {
        self.state = DomainState::new(self.initial_difficulty);
    }
}

fn window_mean(outcomes: &VecDeque<bool>) -> f64 {
    if outcomes.is_empty() {
        return INITIAL_SUCCESS_RATE;
    }
    outcomes.iter().filter(|&&s| s).count() as f64 / outcomes.len() as f64
}

/// Snaps to a 1e-9 grid so repeated steps do not accumulate float drift.
fn snap(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}
