//! Outbound event names and payloads for trivia rooms.

use serde::Serialize;
use std::collections::HashMap;

use super::room::{Phase, Round};

pub const ROOM_STATE: &str = "room-state";
pub const PLAYER_JOINED: &str = "player-joined";
pub const PLAYER_LEFT: &str = "player-left";
pub const ROUND_CHANGE: &str = "round-change";
pub const PHASE_CHANGE: &str = "phase-change";
pub const CLUE_SELECTED: &str = "clue-selected";
pub const DAILY_DOUBLE: &str = "daily-double";
pub const BUZZER_RESULT: &str = "buzzer-result";
pub const BUZZER_EXPIRED: &str = "buzzer-expired";
pub const ANSWER_RESULT: &str = "answer-result";
pub const SCORES_UPDATE: &str = "scores-update";
pub const FINAL_CATEGORY: &str = "final-category";
pub const FINAL_CLUE: &str = "final-clue";
pub const FINAL_WAGER_SUBMITTED: &str = "final-wager-submitted";
pub const FINAL_ANSWER_SUBMITTED: &str = "final-answer-submitted";
pub const FINAL_JEOPARDY_REVEAL: &str = "final-jeopardy-reveal";
pub const GAME_OVER: &str = "game-over";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub socket_id: String,
    pub name: String,
    pub color: String,
    pub score: i64,
    pub is_cpu: bool,
}

/// One selectable board slot; clue text stays server-side until selected,
/// and daily doubles are not flagged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSlot {
    pub category: usize,
    pub row: u8,
    pub value: i64,
    pub used: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePayload {
    pub room_id: String,
    pub game_id: String,
    pub phase: Phase,
    pub round: Round,
    pub players: Vec<PlayerSummary>,
    pub host: String,
    pub controller: String,
    pub categories: Vec<String>,
    pub board: Vec<BoardSlot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChangePayload {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answering: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundChangePayload {
    pub round: Round,
    pub controller: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClueSelectedPayload {
    pub category: usize,
    pub row: u8,
    pub value: i64,
    pub clue: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDoublePayload {
    pub category: usize,
    pub row: u8,
    pub player: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerResultPayload {
    pub socket_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerExpiredPayload {
    pub correct_answer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResultPayload {
    pub socket_id: String,
    pub name: String,
    pub answer: String,
    pub correct: bool,
    pub similarity: f64,
    pub score_change: i64,
    pub new_score: i64,
    /// Revealed once the clue is settled (correct answer or no takers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub rebuzz: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoresUpdatePayload {
    pub scores: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalCategoryPayload {
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalCluePayload {
    pub clue: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalWagerSubmittedPayload {
    pub socket_id: String,
    pub submitted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnswerSubmittedPayload {
    pub socket_id: String,
    pub submitted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRevealPayload {
    pub socket_id: String,
    pub name: String,
    pub answer: String,
    pub wager: i64,
    pub correct: bool,
    pub new_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    pub winner: Option<String>,
    pub final_scores: HashMap<String, i64>,
}
