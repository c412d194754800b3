//! Synthetic trivia opponents.
//!
//! A CPU's behavior is fully described by its difficulty profile: how
//! fast it reaches for the buzzer, how often it answers correctly, and
//! how often it sits a clue out entirely.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuDifficulty {
    Easy,
    Medium,
    Hard,
}

impl CpuDifficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "easy" => Some(CpuDifficulty::Easy),
            "medium" => Some(CpuDifficulty::Medium),
            "hard" => Some(CpuDifficulty::Hard),
            _ => None,
        }
    }

    pub fn profile(self) -> CpuProfile {
        match self {
            CpuDifficulty::Easy => CpuProfile {
                buzz_speed: 0.3,
                accuracy: 0.5,
                skip_chance: 0.35,
            },
            CpuDifficulty::Medium => CpuProfile {
                buzz_speed: 0.5,
                accuracy: 0.7,
                skip_chance: 0.15,
            },
            CpuDifficulty::Hard => CpuProfile {
                buzz_speed: 0.8,
                accuracy: 0.9,
                skip_chance: 0.05,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CpuProfile {
    pub buzz_speed: f64,
    pub accuracy: f64,
    pub skip_chance: f64,
}

/// Pause before a CPU answers, selects a clue, or wagers.
pub const CPU_THINK_DELAY: Duration = Duration::from_millis(1500);

/// Whether the CPU sits this buzzer window out.
pub fn rolls_skip<R: Rng>(profile: CpuProfile, rng: &mut R) -> bool {
    rng.gen::<f64>() < profile.skip_chance
}

/// Buzz reaction delay: a fast profile compresses the base toward the
/// one-second floor, plus up to two seconds of jitter.
pub fn buzz_delay<R: Rng>(profile: CpuProfile, rng: &mut R) -> Duration {
    let base = (2.0 - 1.5 * profile.buzz_speed).max(1.0);
    Duration::from_secs_f64(base + rng.gen_range(0.0..2.0))
}

/// The CPU's submitted answer: the canonical text with probability
/// `accuracy`, otherwise an empty (judged wrong) submission.
pub fn roll_answer<R: Rng>(profile: CpuProfile, correct_answer: &str, rng: &mut R) -> String {
    if rng.gen::<f64>() < profile.accuracy {
        correct_answer.to_string()
    } else {
        String::new()
    }
}

/// Daily-double wager: a share of the score scaled by confidence, noisy.
/// Clamping to the round rules happens in the engine.
pub fn daily_double_wager<R: Rng>(profile: CpuProfile, score: i64, floor: i64, rng: &mut R) -> i64 {
    let base = score.max(floor) as f64;
    (base * profile.accuracy * rng.gen_range(0.6..1.1)).round() as i64
}

/// Final-round wager: accuracy-scaled fraction of the score with noise,
/// never more than the (non-negative) score.
pub fn final_wager<R: Rng>(profile: CpuProfile, score: i64, rng: &mut R) -> i64 {
    let cap = score.max(0);
    let wager = (cap as f64 * profile.accuracy * rng.gen_range(0.5..1.0)).round() as i64;
    wager.clamp(0, cap)
}
