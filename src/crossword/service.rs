use rand::seq::SliceRandom;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::bots::BotDifficulty;
use crate::store::models::{parse_cell_key, Cell, Direction, Puzzle};
use crate::store::Store;
use crate::websockets::Transport;

use super::events::{self, *};
use super::room::{
    BotSeat, CrosswordRoom, Filler, Membership, WordCompletion, BOT_PALETTE,
    CELL_POINTS, DOUBLE_WORD_BONUS, FIRE_DURATION, FIRE_IGNITION_WORDS, HUMAN_PALETTE,
    LAST_SQUARE_BONUS, MAX_HINT_CELLS, REBUS_POINTS, WORD_BONUS, WRONG_PENALTY,
};

const PROGRESS_DEBOUNCE: Duration = Duration::from_millis(200);

/// Authoritative engine for collaborative crossword rooms, keyed by
/// puzzle date. One mutex per room keeps every transition single-writer.
pub struct CrosswordService {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    rooms: RwLock<HashMap<String, Arc<Mutex<CrosswordRoom>>>>,
}

fn room_channel(date: &str) -> String {
    format!("puzzle-{}", date)
}

fn fire_timer(socket_id: &str) -> String {
    format!("fire:{}", socket_id)
}

impl CrosswordService {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn room(&self, date: &str) -> Option<Arc<Mutex<CrosswordRoom>>> {
        self.rooms.read().await.get(date).cloned()
    }

    /// Load the puzzle and any persisted shared state, creating the room
    /// on first join.
    async fn get_or_create_room(&self, date: &str) -> Option<Arc<Mutex<CrosswordRoom>>> {
        if let Some(room) = self.room(date).await {
            return Some(room);
        }

        let puzzle = match self.store.get_puzzle(date).await {
            Ok(Some(puzzle)) => Arc::new(puzzle),
            Ok(None) => return None,
            Err(e) => {
                warn!(date = %date, error = %e, "Failed to load puzzle");
                return None;
            }
        };

        let mut room = CrosswordRoom::new(date.to_string(), puzzle);

        match self.store.get_state(date).await {
            Ok(Some(snapshot)) => {
                for (key, letter) in &snapshot.user_grid {
                    if let Some(cell) = parse_cell_key(key) {
                        room.grid.insert(cell, letter.clone());
                    }
                }
                for (key, filler) in &snapshot.cell_fillers {
                    if let Some(cell) = parse_cell_key(key) {
                        let filler = Filler::from_store_str(filler);
                        if filler == Filler::Hint {
                            room.hints.hint_cells.insert(cell);
                        }
                        room.fillers.insert(cell, filler);
                    }
                }
                room.points = snapshot.points.clone();
                room.guesses = snapshot.guesses.clone();
            }
            Ok(None) => {}
            Err(e) => warn!(date = %date, error = %e, "Failed to load puzzle state"),
        }

        match self.store.get_timer(date).await {
            Ok(seconds) => room.timer.accumulated = seconds,
            Err(e) => warn!(date = %date, error = %e, "Failed to load solve timer"),
        }
        room.completed = room.is_solved();

        let room = Arc::new(Mutex::new(room));
        let mut rooms = self.rooms.write().await;
        Some(rooms.entry(date.to_string()).or_insert(room).clone())
    }

    #[instrument(skip(self))]
    pub async fn join(
        self: &Arc<Self>,
        date: &str,
        socket_id: &str,
        user_name: String,
        color_pref: Option<String>,
    ) {
        let Some(room) = self.get_or_create_room(date).await else {
            self.transport
                .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "puzzle not found"}))
                .await;
            return;
        };

        // Returning players keep their stored color when it is free.
        let stored_color = self
            .store
            .get_user_colors(&[user_name.clone()])
            .await
            .ok()
            .and_then(|colors| colors.get(&user_name).cloned());

        let mut room = room.lock().await;
        if room.members.contains_key(socket_id) {
            return;
        }

        let now = Instant::now();
        if room.human_count() == 0 {
            room.timer.start(now);
        }

        let in_use: HashSet<String> = room.members.values().map(|m| m.color.clone()).collect();
        let color = color_pref
            .or(stored_color)
            .filter(|c| !in_use.contains(c))
            .unwrap_or_else(|| room.pick_color(&HUMAN_PALETTE));

        room.members.insert(
            socket_id.to_string(),
            Membership::new(user_name.clone(), color.clone(), false),
        );

        info!(date = %date, socket_id = %socket_id, user_name = %user_name, "User joined puzzle");

        let channel = room_channel(date);
        self.transport.join(&channel, socket_id).await;
        self.transport
            .emit_to_room_except(
                &channel,
                socket_id,
                USER_JOINED,
                serde_json::to_value(UserJoinedPayload {
                    socket_id: socket_id.to_string(),
                    user_name,
                    color,
                    is_bot: false,
                })
                .unwrap(),
            )
            .await;
        self.transport
            .emit_to_socket(
                socket_id,
                ROOM_STATE,
                serde_json::to_value(self.room_state_payload(&room)).unwrap(),
            )
            .await;
        self.send_timer_sync(&room, Some(socket_id)).await;
        self.broadcast_room_count(&room).await;
    }

    #[instrument(skip(self))]
    pub async fn leave(self: &Arc<Self>, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        let Some(member) = room.members.remove(socket_id) else {
            return;
        };

        let channel = room_channel(date);
        if member.fire.on_fire {
            room.timers.cancel(&fire_timer(socket_id));
            self.broadcast_fire_expired(&room.date, socket_id, &member.user_name)
                .await;
        }
        room.paused.remove(socket_id);
        room.hints.votes.remove(socket_id);

        self.transport.leave(&channel, socket_id).await;
        self.transport
            .emit_to_room(
                &channel,
                USER_LEFT,
                serde_json::to_value(UserLeftPayload {
                    socket_id: socket_id.to_string(),
                    user_name: member.user_name.clone(),
                })
                .unwrap(),
            )
            .await;

        if room.human_count() == 0 {
            // Last human gone: persist the clock, drop ephemeral state,
            // destroy the room.
            let now = Instant::now();
            room.timer.stop(now);
            let seconds = room.timer.accumulated;
            if let Err(e) = self.store.save_timer(date, seconds).await {
                warn!(date = %date, error = %e, "Failed to persist solve timer");
            }
            self.evict_bots(&mut room).await;
            room.timers.cancel_all();
            self.rooms.write().await.remove(date);
            info!(date = %date, "Crossword room destroyed");
            return;
        }

        if room.all_humans_paused() && room.timer.running() {
            self.stop_and_persist_timer(&mut room).await;
        }
        self.broadcast_room_count(&room).await;
    }

    /// Human edit entry point. Bots funnel through the same pipeline via
    /// `bot_fill`.
    #[instrument(skip(self, letter))]
    pub async fn cell_update(
        self: &Arc<Self>,
        date: &str,
        socket_id: &str,
        row: u16,
        col: u16,
        letter: &str,
    ) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !room.members.contains_key(socket_id) {
            return;
        }
        self.apply_cell_update(&mut room, socket_id, row, col, letter)
            .await;
    }

    /// The full authoritative edit pipeline: upserts, scoring, word
    /// completion, fire transitions, puzzle completion. Caller holds the
    /// room lock and has verified membership.
    async fn apply_cell_update(
        self: &Arc<Self>,
        room: &mut CrosswordRoom,
        socket_id: &str,
        row: u16,
        col: u16,
        letter: &str,
    ) {
        if room.puzzle.is_blocked(row, col) {
            return;
        }
        let member = &room.members[socket_id];
        let user_name = member.user_name.clone();
        let was_on_fire = member.fire.on_fire;
        let multiplier = member.fire.multiplier;
        let cell: Cell = (row, col);
        let is_hint_cell = room.hints.hint_cells.contains(&cell);
        let date = room.date.clone();

        if letter.is_empty() {
            room.grid.remove(&cell);
            room.fillers.remove(&cell);
        } else {
            room.grid.insert(cell, letter.to_string());
            room.fillers
                .insert(cell, Filler::Player(user_name.clone()));
        }
        self.persist_cell(&date, cell, letter, room.fillers.get(&cell));

        let mut score_change: i64 = 0;
        let mut word_bonus: i64 = 0;
        let mut last_square_bonus: i64 = 0;
        let mut guess_correct: Option<bool> = None;
        let mut fire_event: Option<FireEvent> = None;

        if !letter.is_empty() && !is_hint_cell {
            let answer = room
                .puzzle
                .cell_answer(row, col)
                .map(|a| a.to_uppercase())
                .unwrap_or_default();
            let correct = letter.to_uppercase() == answer;
            guess_correct = Some(correct);

            let base = if room.puzzle.has_rebus(row, col) && letter.chars().count() > 1 {
                REBUS_POINTS
            } else {
                CELL_POINTS
            };

            if correct {
                score_change = if was_on_fire {
                    (base as f64 * multiplier).round() as i64
                } else {
                    base
                };
            } else {
                score_change = WRONG_PENALTY;
                let member = room.members.get_mut(socket_id).unwrap();
                if was_on_fire {
                    fire_event = Some(FireEvent::Broken);
                    member.fire.clear();
                    room.timers.cancel(&fire_timer(socket_id));
                } else {
                    member.fire.recent_completions.clear();
                }
            }

            self.credit_points(room, &user_name, score_change);
            let stats = room.guesses.entry(user_name.clone()).or_default();
            stats.total += 1;
            if !correct {
                stats.incorrect += 1;
            }
            self.persist_guess(&date, &user_name, correct);

            if correct {
                let completed = self.completed_words_through(room, cell);
                word_bonus = match completed {
                    0 => 0,
                    1 => WORD_BONUS,
                    _ => DOUBLE_WORD_BONUS,
                };
                if was_on_fire && word_bonus > 0 {
                    word_bonus = (word_bonus as f64 * multiplier).round() as i64;
                }
                if word_bonus > 0 {
                    self.credit_points(room, &user_name, word_bonus);
                    room.hints.available = false;
                    room.hints.votes.clear();
                    fire_event = self
                        .advance_fire(room, socket_id, &user_name, completed)
                        .await;
                }

                if !room.completed && room.is_solved() {
                    last_square_bonus = LAST_SQUARE_BONUS;
                    self.credit_points(room, &user_name, last_square_bonus);
                    room.completed = true;
                    info!(date = %date, solved_by = %user_name, "Puzzle completed");
                    self.stop_and_persist_timer(room).await;
                    self.evict_bots(room).await;
                }
            }
        }

        let payload = CellUpdatedPayload {
            row,
            col,
            value: letter.to_string(),
            filled_by: room.fillers.get(&cell).map(|f| f.as_store_str().to_string()),
            socket_id: socket_id.to_string(),
            guess_correct,
            score_change,
            word_bonus,
            last_square_bonus,
            fire_event,
            points: room.points.clone(),
        };
        self.transport
            .emit_to_room(
                &room_channel(&date),
                CELL_UPDATED,
                serde_json::to_value(payload).unwrap(),
            )
            .await;

        if matches!(fire_event, Some(FireEvent::Started) | Some(FireEvent::Extended)) {
            self.broadcast_fire_update(room, socket_id, fire_event.unwrap())
                .await;
        }

        self.schedule_progress(room);
    }

    /// Count how many of the words through `cell` just became fully
    /// correct (0, 1, or 2).
    fn completed_words_through(&self, room: &CrosswordRoom, cell: Cell) -> u32 {
        let words = room.puzzle.words_through(cell.0, cell.1);
        let mut completed = 0;
        for (_, _, cells) in words {
            if cells.iter().all(|c| room.cell_is_correct(*c)) {
                completed += 1;
            }
        }
        completed
    }

    /// Fire-streak transition on a correct fill that earned a word bonus.
    async fn advance_fire(
        self: &Arc<Self>,
        room: &mut CrosswordRoom,
        socket_id: &str,
        user_name: &str,
        completed: u32,
    ) -> Option<FireEvent> {
        let now = Instant::now();
        let fire_cells = room.cells_filled_by(user_name);
        let member = room.members.get_mut(socket_id)?;

        if member.fire.on_fire {
            member.fire.extend(completed, fire_cells);
            let remaining = member
                .fire
                .expires_at
                .map(|e| e.saturating_duration_since(now))
                .unwrap_or(FIRE_DURATION);
            self.arm_fire_expiry(room, socket_id, remaining);
            return Some(FireEvent::Extended);
        }

        member.fire.recent_completions.push(WordCompletion {
            at: now,
            count: completed,
        });
        let in_window = member.fire.prune_window(now);
        if in_window >= FIRE_IGNITION_WORDS {
            member.fire.ignite(now, fire_cells);
            self.arm_fire_expiry(room, socket_id, FIRE_DURATION);
            return Some(FireEvent::Started);
        }
        None
    }

    fn arm_fire_expiry(self: &Arc<Self>, room: &CrosswordRoom, socket_id: &str, delay: Duration) {
        let service = self.clone();
        let date = room.date.clone();
        let sid = socket_id.to_string();
        room.timers.arm(&fire_timer(socket_id), delay, async move {
            service.expire_fire(&date, &sid).await;
        });
    }

    async fn expire_fire(self: &Arc<Self>, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        let Some(member) = room.members.get_mut(socket_id) else {
            return;
        };
        // A cancelling extension may have re-armed; only expire a streak
        // whose deadline has genuinely passed.
        let now = Instant::now();
        if !member.fire.on_fire || member.fire.expires_at.map_or(true, |e| e > now) {
            return;
        }
        let user_name = member.user_name.clone();
        member.fire.clear();
        self.broadcast_fire_expired(date, socket_id, &user_name).await;
    }

    async fn broadcast_fire_expired(&self, date: &str, socket_id: &str, user_name: &str) {
        self.transport
            .emit_to_room(
                &room_channel(date),
                FIRE_EXPIRED,
                json!({"socketId": socket_id, "userName": user_name}),
            )
            .await;
    }

    async fn broadcast_fire_update(
        &self,
        room: &CrosswordRoom,
        socket_id: &str,
        kind: FireEvent,
    ) {
        let Some(member) = room.members.get(socket_id) else {
            return;
        };
        let now = Instant::now();
        let payload = serde_json::to_value(FireUpdatePayload {
            kind,
            socket_id: socket_id.to_string(),
            user_name: member.user_name.clone(),
            remaining_ms: member.fire.remaining_ms(now),
            multiplier: member.fire.multiplier,
            fire_cells: member.fire.fire_cells.iter().copied().collect(),
        })
        .unwrap();
        self.transport
            .emit_to_room(&room_channel(&room.date), FIRE_UPDATE, payload.clone())
            .await;
        // Echo to the originator: bots have no socket, so this falls
        // through for them.
        self.transport
            .emit_to_socket(socket_id, FIRE_UPDATE, payload)
            .await;
    }

    #[instrument(skip(self))]
    pub async fn cursor_move(
        &self,
        date: &str,
        socket_id: &str,
        row: u16,
        col: u16,
        direction: Direction,
    ) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        let max_row = room.puzzle.rows.saturating_sub(1);
        let max_col = room.puzzle.cols.saturating_sub(1);
        let Some(member) = room.members.get_mut(socket_id) else {
            return;
        };
        member.cursor_row = row.min(max_row);
        member.cursor_col = col.min(max_col);
        member.direction = direction;
        let payload = CursorMovedPayload {
            socket_id: socket_id.to_string(),
            row: member.cursor_row,
            col: member.cursor_col,
            direction,
        };
        self.transport
            .emit_to_room_except(
                &room_channel(date),
                socket_id,
                CURSOR_MOVED,
                serde_json::to_value(payload).unwrap(),
            )
            .await;
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !room.members.contains_key(socket_id) {
            return;
        }
        room.paused.insert(socket_id.to_string());
        if room.all_humans_paused() && room.timer.running() {
            self.stop_and_persist_timer(&mut room).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !room.members.contains_key(socket_id) {
            return;
        }
        let was_fully_paused = room.all_humans_paused();
        room.paused.remove(socket_id);
        if was_fully_paused && !room.timer.running() && !room.completed {
            room.timer.start(Instant::now());
            self.send_timer_sync(&room, None).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn hint_vote(self: &Arc<Self>, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        match room.members.get(socket_id) {
            Some(member) if !member.is_bot => {}
            _ => return,
        }
        room.hints.votes.insert(socket_id.to_string());

        let votes = room.hints.votes.len();
        let total = room.human_count();
        self.transport
            .emit_to_room(
                &room_channel(date),
                HINT_VOTE_UPDATE,
                serde_json::to_value(HintVotePayload { votes, total }).unwrap(),
            )
            .await;

        if votes >= total {
            self.reveal_hints(&mut room).await;
        }
    }

    /// Consensus reached: reveal up to five wrong-or-empty cells as hint
    /// fills. Hint cells never score.
    async fn reveal_hints(self: &Arc<Self>, room: &mut CrosswordRoom) {
        let date = room.date.clone();
        let mut candidates: Vec<Cell> = room
            .puzzle
            .playable_cells()
            .into_iter()
            .filter(|cell| !room.cell_is_correct(*cell) && !room.hints.hint_cells.contains(cell))
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(MAX_HINT_CELLS);

        let mut revealed = Vec::new();
        for cell in candidates {
            let answer = room
                .puzzle
                .cell_answer(cell.0, cell.1)
                .unwrap_or_default()
                .to_string();
            room.grid.insert(cell, answer.clone());
            room.fillers.insert(cell, Filler::Hint);
            room.hints.hint_cells.insert(cell);
            self.persist_cell(&date, cell, &answer, Some(&Filler::Hint));
            revealed.push(CellEntry {
                row: cell.0,
                col: cell.1,
                value: answer,
                filled_by: Some(Filler::Hint.as_store_str().to_string()),
            });
        }

        room.hints.votes.clear();
        room.hints.available = false;

        self.transport
            .emit_to_room(
                &room_channel(&date),
                HINT_REVEAL,
                serde_json::to_value(HintRevealPayload { cells: revealed }).unwrap(),
            )
            .await;

        // Hints can finish the grid, but nobody earns the last-square
        // bonus for them.
        if !room.completed && room.is_solved() {
            room.completed = true;
            self.stop_and_persist_timer(room).await;
            self.evict_bots(room).await;
        }
        self.schedule_progress(room);
    }

    #[instrument(skip(self))]
    pub async fn hint_available(&self, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !room.members.contains_key(socket_id) || room.hints.available {
            return;
        }
        room.hints.available = true;
        self.transport
            .emit_to_room(&room_channel(date), HINT_AVAILABLE, json!({}))
            .await;
    }

    #[instrument(skip(self))]
    pub async fn clear_puzzle(self: &Arc<Self>, date: &str, socket_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !room.members.contains_key(socket_id) {
            return;
        }

        self.evict_bots(&mut room).await;
        if let Err(e) = self.store.clear_state(date).await {
            warn!(date = %date, error = %e, "Failed to clear persisted state");
        }

        room.grid.clear();
        room.fillers.clear();
        room.points.clear();
        room.guesses.clear();
        room.hints = Default::default();
        room.completed = false;

        let fire_holders: Vec<(String, String)> = room
            .members
            .iter()
            .filter(|(_, m)| m.fire.on_fire)
            .map(|(id, m)| (id.clone(), m.user_name.clone()))
            .collect();
        for (sid, name) in fire_holders {
            room.timers.cancel(&fire_timer(&sid));
            if let Some(member) = room.members.get_mut(&sid) {
                member.fire.clear();
            }
            self.broadcast_fire_expired(date, &sid, &name).await;
        }

        room.timer.reset(Instant::now());
        let store = self.store.clone();
        let date_owned = date.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.save_timer(&date_owned, 0).await {
                warn!(date = %date_owned, error = %e, "Failed to reset solve timer");
            }
        });

        self.send_timer_sync(&room, None).await;
        self.transport
            .emit_to_room(&room_channel(date), PUZZLE_CLEARED, json!({}))
            .await;
        self.schedule_progress(&room);
        info!(date = %date, by = %socket_id, "Puzzle cleared");
    }

    // ---- bot support -------------------------------------------------

    /// Seat a new bot in the room. The driver is started separately.
    pub async fn add_bot(
        &self,
        date: &str,
        difficulty: BotDifficulty,
    ) -> Option<BotSummary> {
        let room_arc = self.room(date).await?;
        let mut room = room_arc.lock().await;
        if room.completed {
            return None;
        }

        let bot_id = format!("bot-{}", uuid::Uuid::new_v4());
        let name = petname::petname(2, " ")
            .map(|p| format!("{} (AI)", p))
            .unwrap_or_else(|| "Solver (AI)".to_string());
        let color = room.pick_color(&BOT_PALETTE);

        room.members.insert(
            bot_id.clone(),
            Membership::new(name.clone(), color.clone(), true),
        );
        room.bots.insert(
            bot_id.clone(),
            BotSeat {
                difficulty,
                started: false,
                handle: None,
            },
        );

        info!(date = %date, bot_id = %bot_id, name = %name, ?difficulty, "Bot added");

        self.transport
            .emit_to_room(
                &room_channel(date),
                USER_JOINED,
                serde_json::to_value(UserJoinedPayload {
                    socket_id: bot_id.clone(),
                    user_name: name.clone(),
                    color: color.clone(),
                    is_bot: true,
                })
                .unwrap(),
            )
            .await;
        self.broadcast_bot_list(&room).await;

        Some(BotSummary {
            bot_id,
            name,
            color,
            difficulty,
            running: false,
        })
    }

    pub async fn remove_bot(&self, date: &str, bot_id: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        self.remove_bot_locked(&mut room, bot_id).await;
        self.broadcast_bot_list(&room).await;
    }

    async fn remove_bot_locked(&self, room: &mut CrosswordRoom, bot_id: &str) {
        let Some(seat) = room.bots.remove(bot_id) else {
            return;
        };
        if let Some(handle) = seat.handle {
            // A bot can evict itself by typing the last square. Never
            // abort the running task; it exits at its next liveness check.
            if tokio::task::try_id() != Some(handle.id()) {
                handle.abort();
            }
        }
        if let Some(member) = room.members.remove(bot_id) {
            if member.fire.on_fire {
                room.timers.cancel(&fire_timer(bot_id));
                self.broadcast_fire_expired(&room.date, bot_id, &member.user_name)
                    .await;
            }
            self.transport
                .emit_to_room(
                    &room_channel(&room.date),
                    USER_LEFT,
                    serde_json::to_value(UserLeftPayload {
                        socket_id: bot_id.to_string(),
                        user_name: member.user_name,
                    })
                    .unwrap(),
                )
                .await;
        }
        debug!(date = %room.date, bot_id = %bot_id, "Bot evicted");
    }

    async fn evict_bots(&self, room: &mut CrosswordRoom) {
        let bot_ids: Vec<String> = room.bots.keys().cloned().collect();
        for bot_id in bot_ids {
            self.remove_bot_locked(room, &bot_id).await;
        }
        if !room.members.is_empty() {
            self.broadcast_bot_list(room).await;
        }
    }

    pub async fn list_bots(&self, date: &str) -> Vec<BotSummary> {
        let Some(room_arc) = self.room(date).await else {
            return Vec::new();
        };
        let room = room_arc.lock().await;
        self.bot_summaries(&room)
    }

    fn bot_summaries(&self, room: &CrosswordRoom) -> Vec<BotSummary> {
        room.bots
            .iter()
            .filter_map(|(id, seat)| {
                room.members.get(id).map(|m| BotSummary {
                    bot_id: id.clone(),
                    name: m.user_name.clone(),
                    color: m.color.clone(),
                    difficulty: seat.difficulty,
                    running: seat.started,
                })
            })
            .collect()
    }

    async fn broadcast_bot_list(&self, room: &CrosswordRoom) {
        self.transport
            .emit_to_room(
                &room_channel(&room.date),
                AI_BOT_LIST,
                serde_json::to_value(BotListPayload {
                    bots: self.bot_summaries(room),
                })
                .unwrap(),
            )
            .await;
    }

    /// Bots not yet running, with the puzzle they should plan against.
    pub async fn idle_bots(&self, date: &str) -> Vec<(String, BotDifficulty, Arc<Puzzle>)> {
        let Some(room_arc) = self.room(date).await else {
            return Vec::new();
        };
        let room = room_arc.lock().await;
        room.bots
            .iter()
            .filter(|(_, seat)| !seat.started)
            .map(|(id, seat)| (id.clone(), seat.difficulty, room.puzzle.clone()))
            .collect()
    }

    pub async fn attach_bot_driver(
        &self,
        date: &str,
        bot_id: &str,
        handle: tokio::task::JoinHandle<()>,
    ) {
        let Some(room_arc) = self.room(date).await else {
            handle.abort();
            return;
        };
        let mut room = room_arc.lock().await;
        match room.bots.get_mut(bot_id) {
            Some(seat) => {
                seat.started = true;
                seat.handle = Some(handle);
            }
            None => handle.abort(),
        }
        self.broadcast_bot_list(&room).await;
    }

    pub async fn bot_alive(&self, date: &str, bot_id: &str) -> bool {
        match self.room(date).await {
            Some(room_arc) => {
                let room = room_arc.lock().await;
                !room.completed && room.members.contains_key(bot_id)
            }
            None => false,
        }
    }

    /// Whether the bot still needs to type this cell. `None` means the
    /// bot or room is gone and the driver should exit.
    pub async fn bot_cell_pending(&self, date: &str, bot_id: &str, cell: Cell) -> Option<bool> {
        let room_arc = self.room(date).await?;
        let room = room_arc.lock().await;
        if room.completed || !room.members.contains_key(bot_id) {
            return None;
        }
        Some(!room.cell_is_correct(cell))
    }

    /// Cursor hop during the wander phase, clamped to the grid.
    pub async fn bot_hop(&self, date: &str, bot_id: &str, d_row: i32, d_col: i32) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let room = room_arc.lock().await;
        let Some(member) = room.members.get(bot_id) else {
            return;
        };
        let row = (member.cursor_row as i32 + d_row)
            .clamp(0, room.puzzle.rows as i32 - 1) as u16;
        let col = (member.cursor_col as i32 + d_col)
            .clamp(0, room.puzzle.cols as i32 - 1) as u16;
        let direction = member.direction;
        drop(room);
        self.cursor_move(date, bot_id, row, col, direction).await;
    }

    /// Type one cell as the bot: cursor move, then the human edit
    /// pipeline with the correct answer.
    pub async fn bot_fill(
        self: &Arc<Self>,
        date: &str,
        bot_id: &str,
        cell: Cell,
        direction: Direction,
    ) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.completed || !room.members.contains_key(bot_id) {
            return;
        }
        // Re-read the live grid: a human may have beaten the bot here.
        if room.cell_is_correct(cell) {
            return;
        }
        let Some(answer) = room
            .puzzle
            .cell_answer(cell.0, cell.1)
            .map(|a| a.to_string())
        else {
            return;
        };

        if let Some(member) = room.members.get_mut(bot_id) {
            member.cursor_row = cell.0;
            member.cursor_col = cell.1;
            member.direction = direction;
        }
        self.transport
            .emit_to_room_except(
                &room_channel(date),
                bot_id,
                CURSOR_MOVED,
                serde_json::to_value(CursorMovedPayload {
                    socket_id: bot_id.to_string(),
                    row: cell.0,
                    col: cell.1,
                    direction,
                })
                .unwrap(),
            )
            .await;
        self.apply_cell_update(&mut room, bot_id, cell.0, cell.1, &answer)
            .await;
    }

    // ---- shared internals --------------------------------------------

    fn credit_points(&self, room: &mut CrosswordRoom, user_name: &str, delta: i64) {
        if delta == 0 {
            return;
        }
        *room.points.entry(user_name.to_string()).or_insert(0) += delta;
        let store = self.store.clone();
        let date = room.date.clone();
        let name = user_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.add_points(&date, &name, delta).await {
                warn!(date = %date, name = %name, error = %e, "Failed to persist points");
            }
        });
    }

    fn persist_guess(&self, date: &str, user_name: &str, correct: bool) {
        let store = self.store.clone();
        let date = date.to_string();
        let name = user_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.add_guess(&date, &name, correct).await {
                warn!(date = %date, name = %name, error = %e, "Failed to persist guess");
            }
        });
    }

    fn persist_cell(&self, date: &str, cell: Cell, letter: &str, filler: Option<&Filler>) {
        let store = self.store.clone();
        let date = date.to_string();
        let letter = letter.to_string();
        let filler = filler.map(|f| f.as_store_str().to_string()).unwrap_or_default();
        tokio::spawn(async move {
            if let Err(e) = store.upsert_cell(&date, cell.0, cell.1, &letter).await {
                warn!(date = %date, error = %e, "Failed to persist cell");
            }
            if let Err(e) = store
                .upsert_cell_filler(&date, cell.0, cell.1, &filler)
                .await
            {
                warn!(date = %date, error = %e, "Failed to persist cell filler");
            }
        });
    }

    async fn stop_and_persist_timer(&self, room: &mut CrosswordRoom) {
        room.timer.stop(Instant::now());
        let seconds = room.timer.accumulated;
        let store = self.store.clone();
        let date = room.date.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_timer(&date, seconds).await {
                warn!(date = %date, error = %e, "Failed to persist solve timer");
            }
        });
        self.send_timer_sync(room, None).await;
    }

    async fn send_timer_sync(&self, room: &CrosswordRoom, only_to: Option<&str>) {
        let payload = serde_json::to_value(TimerSyncPayload {
            seconds: room.timer.elapsed_secs(Instant::now()),
            running: room.timer.running(),
        })
        .unwrap();
        match only_to {
            Some(socket_id) => {
                self.transport
                    .emit_to_socket(socket_id, TIMER_SYNC, payload)
                    .await
            }
            None => {
                self.transport
                    .emit_to_room(&room_channel(&room.date), TIMER_SYNC, payload)
                    .await
            }
        }
    }

    async fn broadcast_room_count(&self, room: &CrosswordRoom) {
        self.transport
            .emit_to_room(
                &room_channel(&room.date),
                ROOM_COUNT,
                serde_json::to_value(RoomCountPayload {
                    count: room.members.len(),
                })
                .unwrap(),
            )
            .await;
    }

    /// Debounced cross-date progress summary for the calendar listeners.
    fn schedule_progress(self: &Arc<Self>, room: &CrosswordRoom) {
        let service = self.clone();
        let date = room.date.clone();
        room.timers
            .arm("progress", PROGRESS_DEBOUNCE, async move {
                service.emit_progress(&date).await;
            });
    }

    async fn emit_progress(&self, date: &str) {
        let Some(room_arc) = self.room(date).await else {
            return;
        };
        let room = room_arc.lock().await;
        let total = room.puzzle.playable_cells().len();
        let filled = room.grid.values().filter(|v| !v.is_empty()).count();
        let correct = room
            .puzzle
            .playable_cells()
            .into_iter()
            .filter(|c| room.cell_is_correct(*c))
            .count();
        self.transport
            .emit_to_room(
                events::CALENDAR_ROOM,
                PUZZLE_PROGRESS,
                serde_json::to_value(PuzzleProgressPayload {
                    date: date.to_string(),
                    filled,
                    correct,
                    total,
                })
                .unwrap(),
            )
            .await;
    }

    fn room_state_payload(&self, room: &CrosswordRoom) -> RoomStatePayload {
        RoomStatePayload {
            date: room.date.clone(),
            members: room
                .members
                .iter()
                .map(|(id, m)| MemberSummary {
                    socket_id: id.clone(),
                    user_name: m.user_name.clone(),
                    color: m.color.clone(),
                    cursor_row: m.cursor_row,
                    cursor_col: m.cursor_col,
                    direction: m.direction,
                    is_bot: m.is_bot,
                    on_fire: m.fire.on_fire,
                })
                .collect(),
            cells: room
                .grid
                .iter()
                .map(|(cell, value)| CellEntry {
                    row: cell.0,
                    col: cell.1,
                    value: value.clone(),
                    filled_by: room
                        .fillers
                        .get(cell)
                        .map(|f| f.as_store_str().to_string()),
                })
                .collect(),
            points: room.points.clone(),
            guesses: room
                .guesses
                .iter()
                .map(|(name, stats)| {
                    (
                        name.clone(),
                        GuessSummary {
                            total: stats.total,
                            incorrect: stats.incorrect,
                        },
                    )
                })
                .collect(),
            hint_available: room.hints.available,
            completed: room.completed,
        }
    }

    /// Test/diagnostic access to a room's internals.
    pub async fn with_room<T>(
        &self,
        date: &str,
        f: impl FnOnce(&CrosswordRoom) -> T,
    ) -> Option<T> {
        let room_arc = self.room(date).await?;
        let room = room_arc.lock().await;
        Some(f(&room))
    }

    pub async fn room_exists(&self, date: &str) -> bool {
        self.rooms.read().await.contains_key(date)
    }
}
