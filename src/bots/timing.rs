//! Timing model for synthetic solvers.
//!
//! A bot's whole solve is budgeted up front: a per-difficulty target
//! duration is split into per-word think pauses (25 %) and per-cell
//! typing intervals (75 %), generated with burst structure so the cursor
//! reads like a person typing, not a metronome.

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::store::models::{Cell, Direction, Puzzle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotDifficulty {
    Easy,
    Casual,
    Standard,
    Strong,
    Expert,
}

impl BotDifficulty {
    pub fn index(self) -> usize {
        match self {
            BotDifficulty::Easy => 0,
            BotDifficulty::Casual => 1,
            BotDifficulty::Standard => 2,
            BotDifficulty::Strong => 3,
            BotDifficulty::Expert => 4,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "easy" => Some(BotDifficulty::Easy),
            "casual" => Some(BotDifficulty::Casual),
            "standard" => Some(BotDifficulty::Standard),
            "strong" => Some(BotDifficulty::Strong),
            "expert" => Some(BotDifficulty::Expert),
            _ => None,
        }
    }
}

/// Target solve seconds by day of week (Sunday first) and difficulty.
pub const BASE_SOLVE_SECONDS: [[f64; 5]; 7] = [
    [2940.0, 2390.0, 1835.0, 1560.0, 1195.0], // Sun
    [630.0, 510.0, 395.0, 335.0, 255.0],      // Mon
    [770.0, 625.0, 480.0, 410.0, 310.0],      // Tue
    [1320.0, 1075.0, 825.0, 700.0, 535.0],    // Wed
    [1680.0, 1365.0, 1050.0, 890.0, 680.0],   // Thu
    [2000.0, 1625.0, 1250.0, 1065.0, 810.0],  // Fri
    [2400.0, 1950.0, 1500.0, 1275.0, 975.0],  // Sat
];

/// Per-difficulty spread applied on top of the base time.
pub const SOLVE_MULTIPLIER_RANGE: [(f64, f64); 5] = [
    (0.85, 1.25),
    (0.90, 1.18),
    (0.92, 1.15),
    (0.94, 1.12),
    (0.96, 1.08),
];

/// Probability of wandering off before settling on a word.
pub const WANDER_CHANCE: [f64; 5] = [0.75, 0.65, 0.55, 0.40, 0.25];

/// No emitted interval goes below this, so the cursor stays visible.
pub const MIN_INTERVAL_MS: u64 = 40;

const THINK_SHARE: f64 = 0.25;
const CELL_SHARE: f64 = 0.75;

/// Day-of-week index (Sunday = 0) for a puzzle date, read at noon so DST
/// edges cannot shift the day.
pub fn day_of_week(date: &str) -> usize {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| {
            d.and_hms_opt(12, 0, 0)
                .map(|dt| dt.weekday().num_days_from_sunday() as usize)
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Draw the bot's target solve time in seconds.
pub fn target_solve_seconds<R: Rng>(date: &str, difficulty: BotDifficulty, rng: &mut R) -> f64 {
    let dow = day_of_week(date);
    let base = BASE_SOLVE_SECONDS[dow][difficulty.index()];
    let (lo, hi) = SOLVE_MULTIPLIER_RANGE[difficulty.index()];
    base * rng.gen_range(lo..hi)
}

/// One word in the bot's queue with its budgeted pauses.
#[derive(Debug, Clone)]
pub struct PlannedWord {
    pub direction: Direction,
    pub cells: Vec<Cell>,
    pub think_ms: u64,
    pub cell_ms: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct SolvePlan {
    pub words: Vec<PlannedWord>,
    pub total_ms: u64,
    pub wander_chance: f64,
}

/// Raw think pause for one word, in seconds: an occasional long stare,
/// more often a medium or quick beat.
fn raw_think<R: Rng>(rng: &mut R) -> f64 {
    let roll: f64 = rng.gen();
    if roll < 0.25 {
        rng.gen_range(3.0..10.0)
    } else if roll < 0.55 {
        rng.gen_range(0.8..3.0)
    } else {
        rng.gen_range(0.1..0.8)
    }
}

/// Raw per-cell intervals generated in streaks of 2-8 cells at one speed
/// class, each cell jittered.
fn raw_cells<R: Rng>(count: usize, rng: &mut R) -> Vec<f64> {
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let streak_len = rng.gen_range(2..=8usize);
        let class = rng.gen_range(0..3u8);
        let (lo, hi) = match class {
            0 => (0.2, 0.6),
            1 => (0.5, 1.5),
            _ => (1.5, 4.0),
        };
        for _ in 0..streak_len {
            if out.len() == count {
                break;
            }
            let pace = rng.gen_range(lo..hi);
            let jitter = rng.gen_range(0.6..1.4);
            out.push(pace * jitter);
        }
    }
    out
}

fn normalize_to_ms(raw: &[f64], budget_ms: f64) -> Vec<u64> {
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return vec![MIN_INTERVAL_MS; raw.len()];
    }
    raw.iter()
        .map(|r| ((r / sum * budget_ms) as u64).max(MIN_INTERVAL_MS))
        .collect()
}

/// Build a bot's full solve schedule against the puzzle.
///
/// The word queue is shuffled, then rotated by the bot's seat index so
/// concurrent bots start on different words whenever possible.
pub fn build_plan<R: Rng>(
    puzzle: &Puzzle,
    date: &str,
    difficulty: BotDifficulty,
    bot_index: usize,
    rng: &mut R,
) -> SolvePlan {
    let mut words: Vec<(Direction, Vec<Cell>)> = Vec::new();
    for clue in &puzzle.across {
        words.push((Direction::Across, puzzle.word_cells(clue, Direction::Across)));
    }
    for clue in &puzzle.down {
        words.push((Direction::Down, puzzle.word_cells(clue, Direction::Down)));
    }
    // Fisher-Yates, then rotate so seat N starts N words in.
    for i in (1..words.len()).rev() {
        let j = rng.gen_range(0..=i);
        words.swap(i, j);
    }
    if !words.is_empty() {
        let len = words.len();
        words.rotate_left(bot_index % len);
    }

    let total_ms = target_solve_seconds(date, difficulty, rng) * 1000.0;
    let cell_count: usize = words.iter().map(|(_, cells)| cells.len()).sum();

    let think_raw: Vec<f64> = (0..words.len()).map(|_| raw_think(rng)).collect();
    let think_ms = normalize_to_ms(&think_raw, total_ms * THINK_SHARE);

    let cell_raw = raw_cells(cell_count, rng);
    let cell_ms = normalize_to_ms(&cell_raw, total_ms * CELL_SHARE);

    let mut cell_cursor = 0;
    let planned = words
        .into_iter()
        .zip(think_ms)
        .map(|((direction, cells), think)| {
            let slice = &cell_ms[cell_cursor..cell_cursor + cells.len()];
            cell_cursor += cells.len();
            PlannedWord {
                direction,
                cells,
                think_ms: think,
                cell_ms: slice.to_vec(),
            }
        })
        .collect();

    SolvePlan {
        words: planned,
        total_ms: total_ms as u64,
        wander_chance: WANDER_CHANCE[difficulty.index()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn puzzle() -> Puzzle {
        Puzzle {
            date: "2024-03-04".to_string(),
            rows: 3,
            cols: 3,
            grid: vec![
                vec!["C".into(), "A".into(), "T".into()],
                vec!["O".into(), "R".into(), "E".into()],
                vec!["B".into(), "I".into(), "N".into()],
            ],
            rebus: HashMap::new(),
            across: vec![
                crate::store::models::Clue {
                    number: 1,
                    row: 0,
                    col: 0,
                    clue: "Feline".into(),
                    answer: "CAT".into(),
                },
                crate::store::models::Clue {
                    number: 4,
                    row: 1,
                    col: 0,
                    clue: "Mineral source".into(),
                    answer: "ORE".into(),
                },
                crate::store::models::Clue {
                    number: 5,
                    row: 2,
                    col: 0,
                    clue: "Waste basket".into(),
                    answer: "BIN".into(),
                },
            ],
            down: vec![],
        }
    }

    #[test]
    fn weekday_lookup_matches_calendar() {
        assert_eq!(day_of_week("2024-03-04"), 1); // a Monday
        assert_eq!(day_of_week("2024-03-10"), 0); // a Sunday
        assert_eq!(day_of_week("garbage"), 0);
    }

    #[test]
    fn target_time_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let secs = target_solve_seconds("2024-03-04", BotDifficulty::Standard, &mut rng);
            // Monday standard base is 395 s with a 0.92-1.15 spread.
            assert!(secs >= 395.0 * 0.92 && secs <= 395.0 * 1.15);
        }
    }

    #[test]
    fn plan_covers_every_word_and_cell() {
        let mut rng = StdRng::seed_from_u64(11);
        let plan = build_plan(&puzzle(), "2024-03-04", BotDifficulty::Expert, 0, &mut rng);

        assert_eq!(plan.words.len(), 3);
        let cells: usize = plan.words.iter().map(|w| w.cells.len()).sum();
        assert_eq!(cells, 9);
        for word in &plan.words {
            assert_eq!(word.cells.len(), word.cell_ms.len());
        }
    }

    #[test]
    fn intervals_respect_floor_and_budget() {
        let mut rng = StdRng::seed_from_u64(13);
        let plan = build_plan(&puzzle(), "2024-03-10", BotDifficulty::Easy, 0, &mut rng);

        let think_total: u64 = plan.words.iter().map(|w| w.think_ms).sum();
        let cell_total: u64 = plan.words.iter().flat_map(|w| w.cell_ms.iter()).sum();
        for word in &plan.words {
            assert!(word.think_ms >= MIN_INTERVAL_MS);
            assert!(word.cell_ms.iter().all(|&ms| ms >= MIN_INTERVAL_MS));
        }
        // Sunday easy targets ~49 minutes; shares should land near the
        // 25/75 split (the floor can only add time).
        let total = (think_total + cell_total) as f64;
        let think_share = think_total as f64 / total;
        assert!(think_share > 0.15 && think_share < 0.35, "{think_share}");
    }

    #[test]
    fn seat_rotation_staggers_start_words() {
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let plan_a = build_plan(&puzzle(), "2024-03-04", BotDifficulty::Standard, 0, &mut rng_a);
        let plan_b = build_plan(&puzzle(), "2024-03-04", BotDifficulty::Standard, 1, &mut rng_b);
        assert_ne!(plan_a.words[0].cells, plan_b.words[0].cells);
    }

    #[test]
    fn difficulty_parsing() {
        assert_eq!(BotDifficulty::parse("Expert"), Some(BotDifficulty::Expert));
        assert_eq!(BotDifficulty::parse("nope"), None);
    }
}
