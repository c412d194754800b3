//! Monte Carlo parameter search for the wander model.
//!
//! For a given target solve duration, sweep wander chance and wander
//! time, simulate the wander overhead on top of the typing budget, and
//! pick the pair whose expected total lands closest to the target. This
//! runs offline; the runtime ships only the resulting constant tables.

use rand::Rng;

use super::timing::{day_of_week, BotDifficulty, BASE_SOLVE_SECONDS};

pub const CHANCE_MIN: f64 = 0.10;
pub const CHANCE_MAX: f64 = 0.85;
pub const TIME_MIN_MS: f64 = 800.0;
pub const TIME_MAX_MS: f64 = 8000.0;

#[derive(Debug, Clone, Copy)]
pub struct TunerConfig {
    pub trials: usize,
    pub chance_step: f64,
    pub time_step_ms: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            trials: 200,
            chance_step: 0.05,
            time_step_ms: 400.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TunedParams {
    pub wander_chance: f64,
    pub wander_time_ms: f64,
    pub expected_total_ms: f64,
}

/// Simulate `trials` solves: each word draws a geometric number of
/// wander hops at probability `chance`, each hop costing `time_ms`.
fn simulate<R: Rng>(
    chance: f64,
    time_ms: f64,
    word_count: usize,
    cell_total_ms: f64,
    trials: usize,
    rng: &mut R,
) -> f64 {
    let mut sum = 0.0;
    for _ in 0..trials {
        let mut hits: u64 = 0;
        for _ in 0..word_count {
            while rng.gen::<f64>() < chance {
                hits += 1;
            }
        }
        sum += cell_total_ms + hits as f64 * time_ms;
    }
    sum / trials as f64
}

/// Sweep the parameter grid and return the pair minimizing the distance
/// between the expected total and `target_ms`.
pub fn tune<R: Rng>(
    target_ms: f64,
    word_count: usize,
    cell_total_ms: f64,
    config: TunerConfig,
    rng: &mut R,
) -> TunedParams {
    let mut best = TunedParams {
        wander_chance: CHANCE_MIN,
        wander_time_ms: TIME_MIN_MS,
        expected_total_ms: f64::INFINITY,
    };
    let mut best_error = f64::INFINITY;

    let mut chance = CHANCE_MIN;
    while chance <= CHANCE_MAX + 1e-9 {
        let mut time_ms = TIME_MIN_MS;
        while time_ms <= TIME_MAX_MS + 1e-9 {
            let expected = simulate(chance, time_ms, word_count, cell_total_ms, config.trials, rng);
            let error = (expected - target_ms).abs();
            if error < best_error {
                best_error = error;
                best = TunedParams {
                    wander_chance: chance,
                    wander_time_ms: time_ms,
                    expected_total_ms: expected,
                };
            }
            time_ms += config.time_step_ms;
        }
        chance += config.chance_step;
    }
    best
}

/// Tune against the published target for a (date, difficulty) pair,
/// assuming the typing budget is the standard 75 % share.
pub fn tune_for_date<R: Rng>(
    date: &str,
    difficulty: BotDifficulty,
    word_count: usize,
    config: TunerConfig,
    rng: &mut R,
) -> TunedParams {
    let target_ms = BASE_SOLVE_SECONDS[day_of_week(date)][difficulty.index()] * 1000.0;
    tune(target_ms, word_count, target_ms * 0.75, config, rng)
}
