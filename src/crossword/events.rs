//! Outbound event names and payloads for the crossword room.

use serde::Serialize;
use std::collections::HashMap;

use crate::store::models::Direction;

pub const ROOM_STATE: &str = "room-state";
pub const USER_JOINED: &str = "user-joined";
pub const USER_LEFT: &str = "user-left";
pub const CELL_UPDATED: &str = "cell-updated";
pub const CURSOR_MOVED: &str = "cursor-moved";
pub const FIRE_UPDATE: &str = "fire-update";
pub const FIRE_EXPIRED: &str = "fire-expired";
pub const HINT_VOTE_UPDATE: &str = "hint-vote-update";
pub const HINT_REVEAL: &str = "hint-reveal";
pub const HINT_AVAILABLE: &str = "hint-available";
pub const PUZZLE_CLEARED: &str = "puzzle-cleared";
pub const TIMER_SYNC: &str = "timer-sync";
pub const PUZZLE_PROGRESS: &str = "puzzle-progress";
pub const ROOM_COUNT: &str = "room-count";
pub const AI_BOT_LIST: &str = "ai-bot-list";

/// The global listener set for cross-date progress summaries.
pub const CALENDAR_ROOM: &str = "calendar";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub socket_id: String,
    pub user_name: String,
    pub color: String,
    pub cursor_row: u16,
    pub cursor_col: u16,
    pub direction: Direction,
    pub is_bot: bool,
    pub on_fire: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEntry {
    pub row: u16,
    pub col: u16,
    pub value: String,
    pub filled_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePayload {
    pub date: String,
    pub members: Vec<MemberSummary>,
    pub cells: Vec<CellEntry>,
    pub points: HashMap<String, i64>,
    pub guesses: HashMap<String, GuessSummary>,
    pub hint_available: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessSummary {
    pub total: u32,
    pub incorrect: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedPayload {
    pub socket_id: String,
    pub user_name: String,
    pub color: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
    pub socket_id: String,
    pub user_name: String,
}

/// Fire transition kinds carried by `fire-update` and `cell-updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FireEvent {
    Started,
    Extended,
    Broken,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FireUpdatePayload {
    #[serde(rename = "type")]
    pub kind: FireEvent,
    pub socket_id: String,
    pub user_name: String,
    pub remaining_ms: u64,
    pub multiplier: f64,
    pub fire_cells: Vec<(u16, u16)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdatedPayload {
    pub row: u16,
    pub col: u16,
    pub value: String,
    pub filled_by: Option<String>,
    pub socket_id: String,
    pub guess_correct: Option<bool>,
    pub score_change: i64,
    pub word_bonus: i64,
    pub last_square_bonus: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_event: Option<FireEvent>,
    pub points: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedPayload {
    pub socket_id: String,
    pub row: u16,
    pub col: u16,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintVotePayload {
    pub votes: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRevealPayload {
    pub cells: Vec<CellEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSyncPayload {
    pub seconds: u64,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleProgressPayload {
    pub date: String,
    pub filled: usize,
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCountPayload {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSummary {
    pub bot_id: String,
    pub name: String,
    pub color: String,
    pub difficulty: crate::bots::BotDifficulty,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotListPayload {
    pub bots: Vec<BotSummary>,
}
