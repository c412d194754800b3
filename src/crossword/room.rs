use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::scheduler::TimerRegistry;
use crate::store::models::{Cell, Direction, GuessStats, Puzzle};

/// Colors handed to human solvers, in preference order.
pub const HUMAN_PALETTE: [&str; 6] = [
    "#4CAF50", "#222222", "#FF9800", "#E91E63", "#9C27B0", "#FF00FF",
];

/// Bots draw from their own palette so they are visually distinct.
pub const BOT_PALETTE: [&str; 6] = [
    "#607D8B", "#795548", "#3F51B5", "#009688", "#8BC34A", "#FFC107",
];

/// Scoring constants.
pub const CELL_POINTS: i64 = 10;
pub const REBUS_POINTS: i64 = 50;
pub const WRONG_PENALTY: i64 = -30;
pub const WORD_BONUS: i64 = 50;
pub const DOUBLE_WORD_BONUS: i64 = 250;
pub const LAST_SQUARE_BONUS: i64 = 250;

pub const FIRE_WINDOW: Duration = Duration::from_secs(30);
pub const FIRE_DURATION: Duration = Duration::from_secs(30);
pub const FIRE_EXTENSION: Duration = Duration::from_secs(5);
pub const FIRE_BASE_MULTIPLIER: f64 = 1.5;
/// Words needed inside the window to ignite.
pub const FIRE_IGNITION_WORDS: u32 = 3;

pub const MAX_HINT_CELLS: usize = 5;

/// Who filled a cell. The store boundary serializes `Hint` as the
/// reserved sentinel string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filler {
    Player(String),
    Hint,
}

pub const HINT_SENTINEL: &str = "(hint)";

impl Filler {
    pub fn as_store_str(&self) -> &str {
        match self {
            Filler::Player(name) => name,
            Filler::Hint => HINT_SENTINEL,
        }
    }

    pub fn from_store_str(raw: &str) -> Self {
        if raw == HINT_SENTINEL {
            Filler::Hint
        } else {
            Filler::Player(raw.to_string())
        }
    }
}

/// A word-completion event inside the sliding ignition window.
#[derive(Debug, Clone)]
pub struct WordCompletion {
    pub at: Instant,
    pub count: u32,
}

/// Per-membership streak state. Lives inside the membership record so
/// eviction can never leak a live expiry timer.
#[derive(Debug, Default)]
pub struct FireState {
    pub recent_completions: Vec<WordCompletion>,
    pub on_fire: bool,
    pub expires_at: Option<Instant>,
    pub fire_cells: HashSet<Cell>,
    pub multiplier: f64,
    pub words_completed_on_fire: u32,
}

impl FireState {
    pub fn ignite(&mut self, now: Instant, fire_cells: HashSet<Cell>) {
        self.on_fire = true;
        self.expires_at = Some(now + FIRE_DURATION);
        self.multiplier = FIRE_BASE_MULTIPLIER;
        self.words_completed_on_fire = 0;
        self.fire_cells = fire_cells;
        self.recent_completions.clear();
    }

    pub fn extend(&mut self, completed: u32, fire_cells: HashSet<Cell>) {
        if let Some(expires_at) = self.expires_at.as_mut() {
            *expires_at += FIRE_EXTENSION;
        }
        self.words_completed_on_fire += completed;
        self.multiplier =
            FIRE_BASE_MULTIPLIER + 0.5 * f64::from(self.words_completed_on_fire / 3);
        self.fire_cells = fire_cells;
    }

    pub fn clear(&mut self) {
        self.on_fire = false;
        self.expires_at = None;
        self.fire_cells.clear();
        self.multiplier = 0.0;
        self.words_completed_on_fire = 0;
        self.recent_completions.clear();
    }

    /// Drop completions older than the ignition window and return the
    /// surviving word count.
    pub fn prune_window(&mut self, now: Instant) -> u32 {
        self.recent_completions
            .retain(|c| now.duration_since(c.at) < FIRE_WINDOW);
        self.recent_completions.iter().map(|c| c.count).sum()
    }

    pub fn remaining_ms(&self, now: Instant) -> u64 {
        self.expires_at
            .map(|e| e.saturating_duration_since(now).as_millis() as u64)
            .unwrap_or(0)
    }
}

/// One seat in the room: humans and bots share the structure, bots carry
/// `is_bot` and a driver seat in `CrosswordRoom::bots`.
#[derive(Debug)]
pub struct Membership {
    pub user_name: String,
    pub color: String,
    pub cursor_row: u16,
    pub cursor_col: u16,
    pub direction: Direction,
    pub is_bot: bool,
    pub fire: FireState,
}

impl Membership {
    pub fn new(user_name: String, color: String, is_bot: bool) -> Self {
        Self {
            user_name,
            color,
            cursor_row: 0,
            cursor_col: 0,
            direction: Direction::Across,
            is_bot,
            fire: FireState::default(),
        }
    }
}

/// Wall-clock solve timer: accumulated seconds plus an optional running
/// segment.
#[derive(Debug, Default)]
pub struct SolveTimer {
    pub accumulated: u64,
    pub started_at: Option<Instant>,
}

impl SolveTimer {
    pub fn running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn stop(&mut self, now: Instant) {
        if let Some(started) = self.started_at.take() {
            self.accumulated += now.duration_since(started).as_secs();
        }
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.accumulated
            + self
                .started_at
                .map(|s| now.duration_since(s).as_secs())
                .unwrap_or(0)
    }

    pub fn reset(&mut self, now: Instant) {
        self.accumulated = 0;
        self.started_at = Some(now);
    }
}

#[derive(Debug, Default)]
pub struct HintState {
    pub votes: HashSet<String>,
    pub hint_cells: HashSet<Cell>,
    pub available: bool,
}

/// Driver seat for a synthetic solver. The handle aborts the driver task.
#[derive(Debug)]
pub struct BotSeat {
    pub difficulty: crate::bots::BotDifficulty,
    pub started: bool,
    pub handle: Option<JoinHandle<()>>,
}

/// Authoritative state for one collaborative crossword, keyed by puzzle
/// date. Mutated only under the room's mutex.
pub struct CrosswordRoom {
    pub date: String,
    pub puzzle: Arc<Puzzle>,
    pub members: HashMap<String, Membership>,
    pub grid: HashMap<Cell, String>,
    pub fillers: HashMap<Cell, Filler>,
    pub points: HashMap<String, i64>,
    pub guesses: HashMap<String, GuessStats>,
    pub timer: SolveTimer,
    pub hints: HintState,
    pub paused: HashSet<String>,
    pub bots: HashMap<String, BotSeat>,
    pub timers: TimerRegistry,
    pub completed: bool,
}

impl CrosswordRoom {
    pub fn new(date: String, puzzle: Arc<Puzzle>) -> Self {
        Self {
            date,
            puzzle,
            members: HashMap::new(),
            grid: HashMap::new(),
            fillers: HashMap::new(),
            points: HashMap::new(),
            guesses: HashMap::new(),
            timer: SolveTimer::default(),
            hints: HintState::default(),
            paused: HashSet::new(),
            bots: HashMap::new(),
            timers: TimerRegistry::new(),
            completed: false,
        }
    }

    pub fn human_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|(_, m)| !m.is_bot)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn human_count(&self) -> usize {
        self.members.values().filter(|m| !m.is_bot).count()
    }

    pub fn all_humans_paused(&self) -> bool {
        let humans = self.human_ids();
        !humans.is_empty() && humans.iter().all(|id| self.paused.contains(id))
    }

    /// Current value of a cell, uppercased for comparison.
    pub fn cell_value(&self, cell: Cell) -> Option<String> {
        self.grid.get(&cell).map(|v| v.to_uppercase())
    }

    pub fn cell_is_correct(&self, cell: Cell) -> bool {
        match (
            self.cell_value(cell),
            self.puzzle.cell_answer(cell.0, cell.1),
        ) {
            (Some(value), Some(answer)) => value == answer.to_uppercase(),
            _ => false,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.puzzle
            .playable_cells()
            .into_iter()
            .all(|cell| self.cell_is_correct(cell))
    }

    /// Every cell a player has filled, per the filler map. These become
    /// the member's fire cells on ignition/extension.
    pub fn cells_filled_by(&self, user_name: &str) -> HashSet<Cell> {
        self.fillers
            .iter()
            .filter(|(_, f)| matches!(f, Filler::Player(n) if n == user_name))
            .map(|(cell, _)| *cell)
            .collect()
    }

    pub fn pick_color(&self, palette: &[&str]) -> String {
        let in_use: HashSet<&str> = self.members.values().map(|m| m.color.as_str()).collect();
        palette
            .iter()
            .find(|c| !in_use.contains(**c))
            .copied()
            .unwrap_or(palette[0])
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_timer_accumulates_across_segments() {
        let t0 = Instant::now();
        let mut timer = SolveTimer::default();
        timer.start(t0);
        timer.stop(t0 + Duration::from_secs(10));
        assert_eq!(timer.accumulated, 10);

        timer.start(t0 + Duration::from_secs(20));
        assert_eq!(timer.elapsed_secs(t0 + Duration::from_secs(25)), 15);
        timer.reset(t0 + Duration::from_secs(30));
        assert_eq!(timer.accumulated, 0);
        assert!(timer.running());
    }

    #[test]
    fn fire_window_prunes_old_completions() {
        let t0 = Instant::now();
        let mut fire = FireState::default();
        fire.recent_completions.push(WordCompletion { at: t0, count: 1 });
        fire.recent_completions.push(WordCompletion {
            at: t0 + Duration::from_secs(20),
            count: 2,
        });

        assert_eq!(fire.prune_window(t0 + Duration::from_secs(25)), 3);
        // The first completion ages out of the 30 s window.
        assert_eq!(fire.prune_window(t0 + Duration::from_secs(31)), 2);
    }

    #[test]
    fn fire_multiplier_steps_every_three_words() {
        let t0 = Instant::now();
        let mut fire = FireState::default();
        fire.ignite(t0, HashSet::new());
        assert_eq!(fire.multiplier, 1.5);

        fire.extend(2, HashSet::new());
        assert_eq!(fire.multiplier, 1.5);
        fire.extend(1, HashSet::new());
        assert_eq!(fire.multiplier, 2.0);
        fire.extend(3, HashSet::new());
        assert_eq!(fire.multiplier, 2.5);
    }

    #[test]
    fn filler_sentinel_round_trips() {
        assert_eq!(Filler::Hint.as_store_str(), "(hint)");
        assert_eq!(Filler::from_store_str("(hint)"), Filler::Hint);
        assert_eq!(
            Filler::from_store_str("ada"),
            Filler::Player("ada".to_string())
        );
    }
}
