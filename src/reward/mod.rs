//! Attempt reward scoring.
//!
//! The total reward combines four components:
//!
//! | Component | Value | Weight |
//! |---|---|---|
//! | uncertainty | `-abs(p - target)` | `uncertainty_weight` |
//! | tool use | `-0.2` without calls, else `min(0.1 * ok_calls, 1.0)` | `tool_use_weight` |
//! | novelty | `-1.0` for a repeated key, `-0.5` above the similarity threshold | `novelty_weight` |
//! | correctness | `+1.0` / `-0.5` | fixed `0.3` |

mod engine;

pub use engine::{
    RewardBreakdown, RewardEngine, RewardInput, RewardWeights, CORRECTNESS_WEIGHT, NOVELTY_MEMORY,
};
