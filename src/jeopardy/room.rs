use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::scheduler::TimerRegistry;
use crate::store::models::{BoardRound, JeopardyGame};

use super::cpu::CpuDifficulty;

pub const MAX_PLAYERS: usize = 4;
pub const BOARD_CATEGORIES: usize = 6;
pub const BOARD_ROWS: u8 = 5;

/// Room ids avoid the lookalike characters I, O, 0 and 1.
pub const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_ID_LEN: usize = 4;

/// Material palette for trivia players.
pub const TRIVIA_PALETTE: [&str; 8] = [
    "#F44336", "#2196F3", "#4CAF50", "#FF9800", "#9C27B0", "#00BCD4", "#FFEB3B", "#795548",
];

pub fn generate_room_id<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

/// The trivia state machine's phases. Wire names are camelCase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Lobby,
    SelectingClue,
    ReadingClue,
    BuzzerOpen,
    PlayerAnswering,
    ShowingResult,
    DailyDoubleWager,
    DailyDoubleAnswer,
    FinalCategory,
    FinalWager,
    FinalClue,
    FinalResults,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Round {
    Jeopardy,
    DoubleJeopardy,
    FinalJeopardy,
}

impl Round {
    pub fn as_str(self) -> &'static str {
        match self {
            Round::Jeopardy => "jeopardy",
            Round::DoubleJeopardy => "doubleJeopardy",
            Round::FinalJeopardy => "finalJeopardy",
        }
    }

    /// Daily-double floor: a low or negative score can still wager up to
    /// the round minimum.
    pub fn wager_floor(self) -> i64 {
        match self {
            Round::Jeopardy => 1000,
            _ => 2000,
        }
    }
}

/// Clamp a daily-double wager: at least 5, at most the larger of the
/// round minimum and the player's score.
pub fn clamp_daily_double_wager(round: Round, score: i64, wager: i64) -> i64 {
    wager.min(round.wager_floor().max(score)).max(5)
}

#[derive(Debug, Clone)]
pub struct TriviaPlayer {
    pub name: String,
    pub color: String,
    pub score: i64,
    pub is_cpu: bool,
    pub cpu_difficulty: Option<CpuDifficulty>,
    pub device_id: Option<String>,
}

/// The clue currently in play.
#[derive(Debug, Clone)]
pub struct ActiveClue {
    pub category: usize,
    pub row: u8,
    pub value: i64,
    pub clue: String,
    pub answer: String,
    pub daily_double: bool,
}

/// Fan-in state for the final round.
#[derive(Debug, Default)]
pub struct FinalState {
    pub wagers: HashMap<String, i64>,
    pub answers: HashMap<String, String>,
    pub reveal_order: Vec<String>,
    pub revealed: usize,
}

/// Authoritative state for one trivia room. Mutated only under the
/// room's mutex.
pub struct JeopardyRoom {
    pub room_id: String,
    pub game: Arc<JeopardyGame>,
    pub phase: Phase,
    pub round: Round,
    pub used_clues: HashSet<(usize, u8)>,
    pub players: HashMap<String, TriviaPlayer>,
    pub join_order: Vec<String>,
    pub host: String,
    pub controller: String,
    pub current_clue: Option<ActiveClue>,
    pub buzzed: HashSet<String>,
    pub answering: Option<String>,
    pub daily_double_wager: Option<i64>,
    pub final_state: FinalState,
    pub clues_answered: u32,
    pub timers: TimerRegistry,
}

impl JeopardyRoom {
    pub fn new(room_id: String, game: Arc<JeopardyGame>, host: String) -> Self {
        Self {
            room_id,
            game,
            phase: Phase::Lobby,
            round: Round::Jeopardy,
            used_clues: HashSet::new(),
            players: HashMap::new(),
            join_order: Vec::new(),
            host: host.clone(),
            controller: host,
            current_clue: None,
            buzzed: HashSet::new(),
            answering: None,
            daily_double_wager: None,
            final_state: FinalState::default(),
            clues_answered: 0,
            timers: TimerRegistry::new(),
        }
    }

    pub fn board(&self) -> &BoardRound {
        match self.round {
            Round::DoubleJeopardy => &self.game.double_jeopardy_round,
            _ => &self.game.jeopardy_round,
        }
    }

    pub fn total_clues(&self) -> u32 {
        (self.game.jeopardy_round.clues.len() + self.game.double_jeopardy_round.clues.len()) as u32
    }

    /// Slots the source data never had count as used from the start.
    pub fn seed_missing_slots(&mut self) {
        for category in 0..BOARD_CATEGORIES {
            for row in 1..=BOARD_ROWS {
                if self.board().clue_at(category, row).is_none() {
                    self.used_clues.insert((category, row));
                }
            }
        }
    }

    pub fn board_exhausted(&self) -> bool {
        (0..BOARD_CATEGORIES)
            .all(|cat| (1..=BOARD_ROWS).all(|row| self.used_clues.contains(&(cat, row))))
    }

    pub fn human_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_cpu).count()
    }

    pub fn cpu_ids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|(_, p)| p.is_cpu)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Everyone who has not buzzed on the current clue yet.
    pub fn unbuzzed_ids(&self) -> Vec<String> {
        self.players
            .keys()
            .filter(|id| !self.buzzed.contains(*id))
            .cloned()
            .collect()
    }

    pub fn pick_color(&self) -> String {
        let in_use: HashSet<&str> = self.players.values().map(|p| p.color.as_str()).collect();
        TRIVIA_PALETTE
            .iter()
            .find(|c| !in_use.contains(**c))
            .copied()
            .unwrap_or(TRIVIA_PALETTE[0])
            .to_string()
    }

    /// First remaining seat in join order, used for host and controller
    /// reassignment after a disconnect.
    pub fn first_seated(&self) -> Option<String> {
        self.join_order
            .iter()
            .find(|id| self.players.contains_key(*id))
            .cloned()
    }

    pub fn scores(&self) -> HashMap<String, i64> {
        self.players
            .iter()
            .map(|(id, p)| (id.clone(), p.score))
            .collect()
    }

    /// Reveal order for the final round: lowest score first.
    pub fn ascending_score_order(&self) -> Vec<String> {
        let mut ids: Vec<(String, i64)> = self
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.score))
            .collect();
        ids.sort_by_key(|(_, score)| *score);
        ids.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wager_clamp_matches_rules() {
        // Score 500 in the first round: cap is the 1000 floor.
        assert_eq!(clamp_daily_double_wager(Round::Jeopardy, 500, 9999), 1000);
        // Negative score still gets the floor.
        assert_eq!(
            clamp_daily_double_wager(Round::DoubleJeopardy, -400, 5000),
            2000
        );
        // A big score raises the cap.
        assert_eq!(clamp_daily_double_wager(Round::Jeopardy, 4200, 9999), 4200);
        // Tiny wagers are raised to 5.
        assert_eq!(clamp_daily_double_wager(Round::Jeopardy, 4200, 1), 5);
    }

    #[test]
    fn room_ids_use_safe_alphabet() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = generate_room_id(&mut rng);
            assert_eq!(id.len(), ROOM_ID_LEN);
            assert!(id
                .bytes()
                .all(|b| ROOM_ID_ALPHABET.contains(&b)));
            assert!(!id.contains(['I', 'O', '0', '1']));
        }
    }

    #[test]
    fn phase_wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&Phase::SelectingClue).unwrap(),
            "\"selectingClue\""
        );
        assert_eq!(
            serde_json::to_string(&Phase::DailyDoubleWager).unwrap(),
            "\"dailyDoubleWager\""
        );
        assert_eq!(
            serde_json::to_string(&Round::DoubleJeopardy).unwrap(),
            "\"doubleJeopardy\""
        );
    }
}
