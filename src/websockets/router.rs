use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bots::{BotDifficulty, BotManager};
use crate::crossword::CrosswordService;
use crate::jeopardy::{CpuDifficulty, JeopardyService};
use crate::store::models::Direction;

use super::messages::ClientMessage;
use super::Transport;

const MAX_ANSWER_LEN: usize = 200;
const MAX_LETTER_LEN: usize = 16;

/// Which experience a socket currently lives in. A socket is in at most
/// one room at a time; joining the other experience leaves the first.
#[derive(Debug, Clone)]
enum SocketHome {
    Crossword(String),
    Jeopardy(String),
}

/// Binds inbound socket events to the owning room engine and validates
/// payload shape and bounds before dispatch. Anything invalid is dropped
/// silently: late and adversarial messages look the same.
pub struct EventRouter {
    crossword: Arc<CrosswordService>,
    jeopardy: Arc<JeopardyService>,
    bots: Arc<BotManager>,
    transport: Arc<dyn Transport>,
    homes: RwLock<HashMap<String, SocketHome>>,
}

impl EventRouter {
    pub fn new(
        crossword: Arc<CrosswordService>,
        jeopardy: Arc<JeopardyService>,
        bots: Arc<BotManager>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            crossword,
            jeopardy,
            bots,
            transport,
            homes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn handle_message(&self, socket_id: &str, raw: &str) {
        let Some(msg) = ClientMessage::parse(raw) else {
            debug!(socket_id = %socket_id, "Dropping unparseable message");
            return;
        };
        self.dispatch(socket_id, msg).await;
    }

    pub async fn handle_disconnect(&self, socket_id: &str) {
        match self.homes.write().await.remove(socket_id) {
            Some(SocketHome::Crossword(date)) => {
                self.crossword.leave(&date, socket_id).await;
            }
            Some(SocketHome::Jeopardy(room_id)) => {
                self.jeopardy.leave_room(&room_id, socket_id).await;
            }
            None => {}
        }
    }

    async fn crossword_home(&self, socket_id: &str) -> Option<String> {
        match self.homes.read().await.get(socket_id) {
            Some(SocketHome::Crossword(date)) => Some(date.clone()),
            _ => None,
        }
    }

    async fn jeopardy_home(&self, socket_id: &str) -> Option<String> {
        match self.homes.read().await.get(socket_id) {
            Some(SocketHome::Jeopardy(room_id)) => Some(room_id.clone()),
            _ => None,
        }
    }

    /// Leave whatever room the socket is in before it joins another.
    async fn vacate(&self, socket_id: &str) {
        self.handle_disconnect(socket_id).await;
    }

    async fn dispatch(&self, socket_id: &str, msg: ClientMessage) {
        match msg.event.as_str() {
            // ---- crossword ------------------------------------------
            "join-puzzle" => {
                let Some(date) = valid_puzzle_date(msg.str_field("date")) else {
                    return;
                };
                let name = msg
                    .name_field("userName")
                    .unwrap_or_else(|| "Guest".to_string());
                let color = msg.str_field("color").map(|c| c.to_string());
                self.vacate(socket_id).await;
                self.crossword.join(&date, socket_id, name, color).await;
                if self.crossword.room_exists(&date).await {
                    self.homes
                        .write()
                        .await
                        .insert(socket_id.to_string(), SocketHome::Crossword(date));
                }
            }
            "leave-puzzle" => {
                if self.crossword_home(socket_id).await.is_some() {
                    self.vacate(socket_id).await;
                }
            }
            "cell-update" => {
                let Some(date) = self.crossword_home(socket_id).await else {
                    return;
                };
                let (Some(row), Some(col)) = (cell_index(&msg, "row"), cell_index(&msg, "col"))
                else {
                    return;
                };
                let letter: String = msg
                    .str_field("letter")
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_LETTER_LEN)
                    .collect();
                self.crossword
                    .cell_update(&date, socket_id, row, col, &letter)
                    .await;
            }
            "cursor-move" => {
                let Some(date) = self.crossword_home(socket_id).await else {
                    return;
                };
                let (Some(row), Some(col)) = (cell_index(&msg, "row"), cell_index(&msg, "col"))
                else {
                    return;
                };
                let direction = match msg.str_field("direction") {
                    Some("down") => Direction::Down,
                    _ => Direction::Across,
                };
                self.crossword
                    .cursor_move(&date, socket_id, row, col, direction)
                    .await;
            }
            "hint-vote" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.crossword.hint_vote(&date, socket_id).await;
                }
            }
            "hint-available" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.crossword.hint_available(&date, socket_id).await;
                }
            }
            "pause-puzzle" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.crossword.pause(&date, socket_id).await;
                }
            }
            "resume-puzzle" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.crossword.resume(&date, socket_id).await;
                }
            }
            "clear-puzzle" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.crossword.clear_puzzle(&date, socket_id).await;
                }
            }
            "add-ai" => {
                let Some(date) = self.crossword_home(socket_id).await else {
                    return;
                };
                let difficulty = msg
                    .str_field("difficulty")
                    .and_then(BotDifficulty::parse)
                    .unwrap_or(BotDifficulty::Standard);
                self.bots.add_bot(&date, difficulty).await;
            }
            "remove-ai" => {
                let Some(date) = self.crossword_home(socket_id).await else {
                    return;
                };
                if let Some(bot_id) = msg.str_field("botId") {
                    self.bots.remove_bot(&date, bot_id).await;
                }
            }
            "start-ai" => {
                if let Some(date) = self.crossword_home(socket_id).await {
                    self.bots.start_bots(&date).await;
                }
            }
            "get-ai-bots" => {
                let Some(date) = self.crossword_home(socket_id).await else {
                    return;
                };
                let bots = self.bots.list_bots(&date).await;
                self.transport
                    .emit_to_socket(socket_id, "ai-bot-list", json!({ "bots": bots }))
                    .await;
            }

            // ---- trivia ---------------------------------------------
            "create-room" => {
                let name = msg
                    .name_field("playerName")
                    .unwrap_or_else(|| "Player".to_string());
                let device_id = msg.str_field("deviceId").map(|d| d.to_string());
                self.vacate(socket_id).await;
                if let Some(room_id) = self.jeopardy.create_room(socket_id, name, device_id).await
                {
                    self.homes
                        .write()
                        .await
                        .insert(socket_id.to_string(), SocketHome::Jeopardy(room_id));
                }
            }
            "join-room" => {
                let Some(room_id) = msg.str_field("roomId").map(|r| r.trim().to_uppercase())
                else {
                    return;
                };
                if room_id.len() != 4 {
                    return;
                }
                let name = msg
                    .name_field("playerName")
                    .unwrap_or_else(|| "Player".to_string());
                let device_id = msg.str_field("deviceId").map(|d| d.to_string());
                self.vacate(socket_id).await;
                self.jeopardy
                    .join_room(socket_id, &room_id, name, device_id)
                    .await;
                if self
                    .jeopardy
                    .with_room(&room_id, |room| room.players.contains_key(socket_id))
                    .await
                    .unwrap_or(false)
                {
                    self.homes
                        .write()
                        .await
                        .insert(socket_id.to_string(), SocketHome::Jeopardy(room_id));
                }
            }
            "leave-room" => {
                if self.jeopardy_home(socket_id).await.is_some() {
                    self.vacate(socket_id).await;
                }
            }
            "start-game" => {
                if let Some(room_id) = self.jeopardy_home(socket_id).await {
                    self.jeopardy.start_game(&room_id, socket_id).await;
                }
            }
            "change-game" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                if let Some(game_id) = msg.str_field("gameId") {
                    self.jeopardy
                        .change_game(&room_id, socket_id, game_id)
                        .await;
                }
            }
            "random-game" => {
                if let Some(room_id) = self.jeopardy_home(socket_id).await {
                    self.jeopardy.random_game(&room_id, socket_id).await;
                }
            }
            "select-clue" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let (Some(category), Some(row)) =
                    (msg.int_field("category"), msg.int_field("row"))
                else {
                    return;
                };
                if !(0..6).contains(&category) || !(1..=6).contains(&row) {
                    return;
                }
                self.jeopardy
                    .select_clue(&room_id, socket_id, category as usize, row as u8)
                    .await;
            }
            "buzz-in" => {
                if let Some(room_id) = self.jeopardy_home(socket_id).await {
                    self.jeopardy.buzz_in(&room_id, socket_id).await;
                }
            }
            "submit-answer" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let answer: String = msg
                    .str_field("answer")
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_ANSWER_LEN)
                    .collect();
                self.jeopardy
                    .submit_answer(&room_id, socket_id, &answer)
                    .await;
            }
            "daily-double-wager" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let Some(wager) = msg.int_field("wager") else {
                    return;
                };
                self.jeopardy
                    .daily_double_wager(&room_id, socket_id, wager)
                    .await;
            }
            "final-jeopardy-wager" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let Some(wager) = msg.int_field("wager") else {
                    return;
                };
                self.jeopardy
                    .final_jeopardy_wager(&room_id, socket_id, wager)
                    .await;
            }
            "final-jeopardy-answer" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let answer: String = msg
                    .str_field("answer")
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_ANSWER_LEN)
                    .collect();
                self.jeopardy
                    .final_jeopardy_answer(&room_id, socket_id, answer)
                    .await;
            }
            "add-cpu" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                let difficulty = msg
                    .str_field("difficulty")
                    .and_then(CpuDifficulty::parse)
                    .unwrap_or(CpuDifficulty::Medium);
                self.jeopardy.add_cpu(&room_id, socket_id, difficulty).await;
            }
            "remove-cpu" => {
                let Some(room_id) = self.jeopardy_home(socket_id).await else {
                    return;
                };
                if let Some(cpu_id) = msg.str_field("cpuId") {
                    self.jeopardy.remove_cpu(&room_id, socket_id, cpu_id).await;
                }
            }

            other => {
                debug!(socket_id = %socket_id, event = %other, "Dropping unknown event");
            }
        }
    }
}

fn cell_index(msg: &ClientMessage, key: &str) -> Option<u16> {
    let value = msg.int_field(key)?;
    u16::try_from(value).ok()
}

/// Puzzle dates are YYYY-MM-DD; anything else is dropped before it can
/// become a store key.
fn valid_puzzle_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = raw
        .char_indices()
        .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit());
    digits_ok.then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_validation_accepts_iso_dates_only() {
        assert_eq!(
            valid_puzzle_date(Some("2024-03-04")),
            Some("2024-03-04".to_string())
        );
        assert_eq!(valid_puzzle_date(Some(" 2024-03-04 ")).as_deref(), Some("2024-03-04"));
        assert_eq!(valid_puzzle_date(Some("03/04/2024")), None);
        assert_eq!(valid_puzzle_date(Some("2024-3-4")), None);
        assert_eq!(valid_puzzle_date(Some("../../etc/passwd")), None);
        assert_eq!(valid_puzzle_date(None), None);
    }

    #[test]
    fn cell_index_rejects_out_of_range() {
        let msg = ClientMessage::parse(
            r#"{"event":"cell-update","payload":{"row":-1,"col":70000,"ok":3}}"#,
        )
        .unwrap();
        assert_eq!(cell_index(&msg, "row"), None);
        assert_eq!(cell_index(&msg, "col"), None);
        assert_eq!(cell_index(&msg, "ok"), Some(3));
    }
}
