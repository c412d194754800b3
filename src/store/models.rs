use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grid coordinate, row-major.
pub type Cell = (u16, u16);

/// Map key format used for cells throughout the store layer ("r,c").
pub fn cell_key(row: u16, col: u16) -> String {
    format!("{},{}", row, col)
}

pub fn parse_cell_key(key: &str) -> Option<Cell> {
    let (r, c) = key.split_once(',')?;
    Some((r.trim().parse().ok()?, c.trim().parse().ok()?))
}

/// Reading direction of a crossword word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Across,
    Down,
}

/// A single across or down clue with its canonical answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clue {
    pub number: u32,
    pub row: u16,
    pub col: u16,
    pub clue: String,
    pub answer: String,
}

/// Immutable puzzle content. `.` in the grid marks a blocked cell; rebus
/// cells hold their full multi-letter answer in `rebus` keyed by "r,c".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Puzzle {
    pub date: String,
    pub rows: u16,
    pub cols: u16,
    pub grid: Vec<Vec<String>>,
    #[serde(default)]
    pub rebus: HashMap<String, String>,
    pub across: Vec<Clue>,
    pub down: Vec<Clue>,
}

impl Puzzle {
    pub fn in_bounds(&self, row: u16, col: u16) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn is_blocked(&self, row: u16, col: u16) -> bool {
        !self.in_bounds(row, col) || self.grid[row as usize][col as usize] == "."
    }

    /// The correct content for a cell: the rebus string if one is defined,
    /// otherwise the single grid letter. `None` for blocked cells.
    pub fn cell_answer(&self, row: u16, col: u16) -> Option<&str> {
        if self.is_blocked(row, col) {
            return None;
        }
        if let Some(rebus) = self.rebus.get(&cell_key(row, col)) {
            return Some(rebus.as_str());
        }
        Some(self.grid[row as usize][col as usize].as_str())
    }

    pub fn has_rebus(&self, row: u16, col: u16) -> bool {
        self.rebus.contains_key(&cell_key(row, col))
    }

    /// All cells of the word starting at the clue's head, walking in the
    /// given direction until a blocked cell or the grid edge.
    pub fn word_cells(&self, clue: &Clue, direction: Direction) -> Vec<Cell> {
        let mut cells = Vec::new();
        let (mut row, mut col) = (clue.row, clue.col);
        while !self.is_blocked(row, col) {
            cells.push((row, col));
            match direction {
                Direction::Across => col += 1,
                Direction::Down => row += 1,
            }
        }
        cells
    }

    /// Every clue (with its direction) whose word passes through the cell.
    pub fn words_through(&self, row: u16, col: u16) -> Vec<(&Clue, Direction, Vec<Cell>)> {
        let mut hits = Vec::new();
        for (clues, direction) in [
            (&self.across, Direction::Across),
            (&self.down, Direction::Down),
        ] {
            for clue in clues {
                let cells = self.word_cells(clue, direction);
                if cells.contains(&(row, col)) {
                    hits.push((clue, direction, cells));
                }
            }
        }
        hits
    }

    pub fn playable_cells(&self) -> Vec<Cell> {
        let mut cells = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                if !self.is_blocked(row, col) {
                    cells.push((row, col));
                }
            }
        }
        cells
    }
}

/// Per-player guess counters. Monotonic, so retries after store faults
/// are safe.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GuessStats {
    pub total: u32,
    pub incorrect: u32,
}

/// Persisted shared state for one puzzle date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PuzzleStateSnapshot {
    /// "r,c" -> current letter(s)
    pub user_grid: HashMap<String, String>,
    /// "r,c" -> player name, or the reserved sentinel "(hint)"
    pub cell_fillers: HashMap<String, String>,
    pub points: HashMap<String, i64>,
    pub guesses: HashMap<String, GuessStats>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A registered device-identified user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub device_id: String,
    pub name: String,
    pub color: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

/// One cell of a trivia board. `row` is 1-based within the category
/// column (1..=5), matching the dollar-value ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardClue {
    pub category: usize,
    pub row: u8,
    pub value: i64,
    pub clue: String,
    pub answer: String,
    #[serde(default)]
    pub daily_double: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRound {
    pub categories: Vec<String>,
    pub clues: Vec<BoardClue>,
}

impl BoardRound {
    pub fn clue_at(&self, category: usize, row: u8) -> Option<&BoardClue> {
        self.clues
            .iter()
            .find(|c| c.category == category && c.row == row)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRound {
    pub category: String,
    pub clue: String,
    pub answer: String,
}

/// Immutable trivia game content: two boards plus an optional final clue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JeopardyGame {
    pub game_id: String,
    pub show_number: i64,
    pub air_date: String,
    #[serde(default)]
    pub season: Option<i64>,
    pub jeopardy_round: BoardRound,
    pub double_jeopardy_round: BoardRound,
    #[serde(default)]
    pub final_jeopardy: Option<FinalRound>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_puzzle() -> Puzzle {
        // 3x3 with a blocked center-right cell:
        //   C A T
        //   O . E
        //   B I N
        Puzzle {
            date: "2024-03-04".to_string(),
            rows: 3,
            cols: 3,
            grid: vec![
                vec!["C".into(), "A".into(), "T".into()],
                vec!["O".into(), ".".into(), "E".into()],
                vec!["B".into(), "I".into(), "N".into()],
            ],
            rebus: HashMap::new(),
            across: vec![Clue {
                number: 1,
                row: 0,
                col: 0,
                clue: "Feline".into(),
                answer: "CAT".into(),
            }],
            down: vec![Clue {
                number: 1,
                row: 0,
                col: 0,
                clue: "Corn core".into(),
                answer: "COB".into(),
            }],
        }
    }

    #[test]
    fn cell_answer_resolves_grid_and_rebus() {
        let mut puzzle = tiny_puzzle();
        assert_eq!(puzzle.cell_answer(0, 0), Some("C"));
        assert_eq!(puzzle.cell_answer(1, 1), None);

        puzzle
            .rebus
            .insert(cell_key(2, 2), "NINETEEN".to_string());
        assert_eq!(puzzle.cell_answer(2, 2), Some("NINETEEN"));
        assert!(puzzle.has_rebus(2, 2));
    }

    #[test]
    fn word_cells_stop_at_blocks() {
        let puzzle = tiny_puzzle();
        let across = puzzle.word_cells(&puzzle.across[0], Direction::Across);
        assert_eq!(across, vec![(0, 0), (0, 1), (0, 2)]);

        let down = puzzle.word_cells(&puzzle.down[0], Direction::Down);
        assert_eq!(down, vec![(0, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn words_through_finds_crossings() {
        let puzzle = tiny_puzzle();
        let hits = puzzle.words_through(0, 0);
        assert_eq!(hits.len(), 2);
        let hits = puzzle.words_through(2, 1);
        assert!(hits.is_empty());
    }

    #[test]
    fn cell_keys_round_trip() {
        assert_eq!(parse_cell_key(&cell_key(4, 11)), Some((4, 11)));
        assert_eq!(parse_cell_key("junk"), None);
    }
}
