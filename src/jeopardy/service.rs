use rand::seq::SliceRandom;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::judge::check_answer;
use crate::store::Store;
use crate::websockets::Transport;

use super::cpu::{self, CpuDifficulty, CPU_THINK_DELAY};
use super::events::*;
use super::room::{
    clamp_daily_double_wager, generate_room_id, ActiveClue, JeopardyRoom, Phase, Round,
    TriviaPlayer, BOARD_CATEGORIES, BOARD_ROWS, MAX_PLAYERS,
};

const READING_DELAY: Duration = Duration::from_secs(3);
const BUZZER_WINDOW: Duration = Duration::from_secs(5);
const ANSWER_WINDOW: Duration = Duration::from_secs(10);
const REBUZZ_DELAY: Duration = Duration::from_millis(1500);
const CORRECT_REVEAL_DELAY: Duration = Duration::from_millis(2500);
const NO_TAKERS_REVEAL_DELAY: Duration = Duration::from_secs(3);
const FINAL_CATEGORY_DELAY: Duration = Duration::from_secs(5);
const FINAL_CLUE_WINDOW: Duration = Duration::from_secs(30);
const FINAL_REVEAL_SPACING: Duration = Duration::from_secs(3);
const GAME_OVER_EVICT_DELAY: Duration = Duration::from_secs(5 * 60);

/// Authoritative engine for trivia rooms: the phased state machine,
/// buzzer arbitration, wagering, and CPU opponents.
pub struct JeopardyService {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    rooms: RwLock<HashMap<String, Arc<Mutex<JeopardyRoom>>>>,
}

fn room_channel(room_id: &str) -> String {
    format!("trivia-{}", room_id)
}

impl JeopardyService {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn room(&self, room_id: &str) -> Option<Arc<Mutex<JeopardyRoom>>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    // ---- lifecycle ---------------------------------------------------

    #[instrument(skip(self))]
    pub async fn create_room(
        self: &Arc<Self>,
        socket_id: &str,
        player_name: String,
        device_id: Option<String>,
    ) -> Option<String> {
        let game = match self.store.get_random_jeopardy_game().await {
            Ok(Some(game)) => Arc::new(game),
            Ok(None) => {
                self.transport
                    .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "no games available"}))
                    .await;
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load a random game");
                self.transport
                    .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "no games available"}))
                    .await;
                return None;
            }
        };

        let mut rooms = self.rooms.write().await;
        let room_id = loop {
            let candidate = generate_room_id(&mut rand::thread_rng());
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut room = JeopardyRoom::new(room_id.clone(), game, socket_id.to_string());
        Self::seat_player(&mut room, socket_id, player_name, false, None, device_id);
        rooms.insert(room_id.clone(), Arc::new(Mutex::new(room)));
        drop(rooms);

        info!(room_id = %room_id, host = %socket_id, "Trivia room created");

        self.transport
            .join(&room_channel(&room_id), socket_id)
            .await;
        self.send_room_state(&room_id).await;
        Some(room_id)
    }

    #[instrument(skip(self))]
    pub async fn join_room(
        self: &Arc<Self>,
        socket_id: &str,
        room_id: &str,
        player_name: String,
        device_id: Option<String>,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            self.transport
                .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "room not found"}))
                .await;
            return;
        };
        let mut room = room_arc.lock().await;
        if room.players.contains_key(socket_id) {
            return;
        }
        if room.players.len() >= MAX_PLAYERS {
            self.transport
                .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "room is full"}))
                .await;
            return;
        }
        if room.phase == Phase::GameOver {
            self.transport
                .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "game is over"}))
                .await;
            return;
        }

        Self::seat_player(&mut room, socket_id, player_name, false, None, device_id);
        self.transport
            .join(&room_channel(room_id), socket_id)
            .await;

        let player = &room.players[socket_id];
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                PLAYER_JOINED,
                serde_json::to_value(PlayerSummary {
                    socket_id: socket_id.to_string(),
                    name: player.name.clone(),
                    color: player.color.clone(),
                    score: player.score,
                    is_cpu: false,
                })
                .unwrap(),
            )
            .await;
        drop(room);
        self.send_room_state(room_id).await;
    }

    fn seat_player(
        room: &mut JeopardyRoom,
        socket_id: &str,
        name: String,
        is_cpu: bool,
        cpu_difficulty: Option<CpuDifficulty>,
        device_id: Option<String>,
    ) {
        let color = room.pick_color();
        room.players.insert(
            socket_id.to_string(),
            TriviaPlayer {
                name,
                color,
                score: 0,
                is_cpu,
                cpu_difficulty,
                device_id,
            },
        );
        room.join_order.push(socket_id.to_string());
    }

    #[instrument(skip(self))]
    pub async fn leave_room(self: &Arc<Self>, room_id: &str, socket_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        self.remove_player(&mut room, socket_id).await;
        self.transport
            .leave(&room_channel(room_id), socket_id)
            .await;

        if room.human_count() == 0 {
            room.timers.cancel_all();
            drop(room);
            self.rooms.write().await.remove(room_id);
            info!(room_id = %room_id, "Trivia room destroyed");
        }
    }

    /// Shared removal path for disconnects and CPU eviction. Handles the
    /// mid-phase holes a departure can leave behind.
    async fn remove_player(self: &Arc<Self>, room: &mut JeopardyRoom, socket_id: &str) {
        let Some(player) = room.players.remove(socket_id) else {
            return;
        };
        room.buzzed.remove(socket_id);
        room.timers.cancel(&format!("cpu-buzz:{}", socket_id));
        room.timers.cancel(&format!("cpu-final:{}", socket_id));

        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                PLAYER_LEFT,
                json!({"socketId": socket_id, "name": player.name}),
            )
            .await;

        if room.players.is_empty() {
            return;
        }

        let first_human = room
            .join_order
            .iter()
            .find(|id| room.players.get(*id).map(|p| !p.is_cpu).unwrap_or(false))
            .cloned();
        if room.host == socket_id {
            if let Some(new_host) = first_human.clone() {
                room.host = new_host.clone();
                debug!(room_id = %room.room_id, new_host = %new_host, "Host reassigned");
            }
        }
        if room.controller == socket_id {
            if let Some(new_controller) = first_human.or_else(|| room.first_seated()) {
                room.controller = new_controller;
            }
            if room.phase == Phase::SelectingClue {
                self.maybe_schedule_cpu_select(room);
            }
        }

        if room.answering.as_deref() == Some(socket_id) {
            room.timers.cancel("answer");
            room.timers.cancel("cpu-answer");
            room.answering = None;
            match room.phase {
                Phase::PlayerAnswering => {
                    if room.unbuzzed_ids().is_empty() {
                        self.reveal_and_settle(room).await;
                    } else {
                        room.phase = Phase::ShowingResult;
                        self.arm_rebuzz(room);
                    }
                }
                Phase::DailyDoubleWager | Phase::DailyDoubleAnswer => {
                    room.phase = Phase::ShowingResult;
                    self.settle_clue(room).await;
                }
                _ => {}
            }
        }

        match room.phase {
            Phase::FinalWager => {
                room.final_state.wagers.remove(socket_id);
                if room.final_state.wagers.len() >= room.players.len() {
                    self.show_final_clue(room).await;
                }
            }
            Phase::FinalClue => {
                room.final_state.wagers.remove(socket_id);
                room.final_state.answers.remove(socket_id);
                if room.final_state.answers.len() >= room.players.len() {
                    room.timers.cancel("final-clue");
                    self.begin_final_reveals(room).await;
                }
            }
            _ => {}
        }

        self.broadcast_scores(room).await;
    }

    // ---- lobby actions ----------------------------------------------

    #[instrument(skip(self))]
    pub async fn start_game(self: &Arc<Self>, room_id: &str, socket_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::Lobby || room.host != socket_id || room.players.is_empty() {
            return;
        }
        room.seed_missing_slots();
        room.phase = Phase::SelectingClue;
        info!(room_id = %room_id, game_id = %room.game.game_id, "Game started");
        self.broadcast_phase(&room).await;
        self.maybe_schedule_cpu_select(&room);
    }

    #[instrument(skip(self))]
    pub async fn change_game(self: &Arc<Self>, room_id: &str, socket_id: &str, game_id: &str) {
        let game = match self.store.get_jeopardy_game(game_id).await {
            Ok(Some(game)) => Arc::new(game),
            _ => {
                self.transport
                    .emit_to_socket(socket_id, ROOM_STATE, json!({"error": "game not found"}))
                    .await;
                return;
            }
        };
        self.swap_game(room_id, socket_id, game).await;
    }

    #[instrument(skip(self))]
    pub async fn random_game(self: &Arc<Self>, room_id: &str, socket_id: &str) {
        let game = match self.store.get_random_jeopardy_game().await {
            Ok(Some(game)) => Arc::new(game),
            _ => return,
        };
        self.swap_game(room_id, socket_id, game).await;
    }

    async fn swap_game(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        game: Arc<crate::store::models::JeopardyGame>,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::Lobby || room.host != socket_id {
            return;
        }
        info!(room_id = %room_id, game_id = %game.game_id, "Game swapped");
        room.game = game;
        room.used_clues.clear();
        room.clues_answered = 0;
        drop(room);
        self.send_room_state(room_id).await;
    }

    #[instrument(skip(self))]
    pub async fn add_cpu(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        difficulty: CpuDifficulty,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::Lobby
            || room.host != socket_id
            || room.players.len() >= MAX_PLAYERS
        {
            return;
        }
        let cpu_id = format!("cpu-{}", uuid::Uuid::new_v4());
        let name = petname::petname(2, " ")
            .map(|p| format!("{} (CPU)", p))
            .unwrap_or_else(|| "Opponent (CPU)".to_string());
        Self::seat_player(&mut room, &cpu_id, name.clone(), true, Some(difficulty), None);
        info!(room_id = %room_id, cpu_id = %cpu_id, ?difficulty, "CPU opponent added");

        let player = &room.players[&cpu_id];
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                PLAYER_JOINED,
                serde_json::to_value(PlayerSummary {
                    socket_id: cpu_id.clone(),
                    name,
                    color: player.color.clone(),
                    score: 0,
                    is_cpu: true,
                })
                .unwrap(),
            )
            .await;
    }

    #[instrument(skip(self))]
    pub async fn remove_cpu(self: &Arc<Self>, room_id: &str, socket_id: &str, cpu_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.host != socket_id {
            return;
        }
        match room.players.get(cpu_id) {
            Some(player) if player.is_cpu => {}
            _ => return,
        }
        self.remove_player(&mut room, cpu_id).await;
    }

    // ---- clue selection and buzzing ---------------------------------

    #[instrument(skip(self))]
    pub async fn select_clue(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        category: usize,
        row: u8,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::SelectingClue
            || room.controller != socket_id
            || room.used_clues.contains(&(category, row))
        {
            return;
        }
        let Some(clue) = room.board().clue_at(category, row).cloned() else {
            return;
        };

        room.used_clues.insert((category, row));
        room.current_clue = Some(ActiveClue {
            category,
            row,
            value: clue.value,
            clue: clue.clue.clone(),
            answer: clue.answer.clone(),
            daily_double: clue.daily_double,
        });

        if clue.daily_double {
            room.phase = Phase::DailyDoubleWager;
            room.answering = Some(room.controller.clone());
            info!(room_id = %room_id, category, row, "Daily double hit");
            self.transport
                .emit_to_room(
                    &room_channel(room_id),
                    DAILY_DOUBLE,
                    serde_json::to_value(DailyDoublePayload {
                        category,
                        row,
                        player: room.controller.clone(),
                    })
                    .unwrap(),
                )
                .await;
            self.broadcast_phase(&room).await;
            self.maybe_schedule_cpu_wager(&room);
            return;
        }

        room.phase = Phase::ReadingClue;
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                CLUE_SELECTED,
                serde_json::to_value(ClueSelectedPayload {
                    category,
                    row,
                    value: clue.value,
                    clue: clue.clue.clone(),
                })
                .unwrap(),
            )
            .await;
        self.broadcast_phase(&room).await;

        let service = self.clone();
        let rid = room_id.to_string();
        room.timers.arm("reading", READING_DELAY, async move {
            service.open_buzzer(&rid).await;
        });
    }

    async fn open_buzzer(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::ReadingClue {
            return;
        }
        self.begin_buzzer_window(&mut room).await;
    }

    /// Shared entry for the first buzzer window and rebuzzes.
    async fn begin_buzzer_window(self: &Arc<Self>, room: &mut JeopardyRoom) {
        room.phase = Phase::BuzzerOpen;
        self.broadcast_phase(room).await;

        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("buzzer", BUZZER_WINDOW, async move {
            service.buzzer_timeout(&rid).await;
        });

        // Independent buzz rolls for every CPU still eligible.
        let mut rng = rand::thread_rng();
        for cpu_id in room.unbuzzed_ids() {
            let Some(player) = room.players.get(&cpu_id) else {
                continue;
            };
            let Some(difficulty) = player.cpu_difficulty else {
                continue;
            };
            let profile = difficulty.profile();
            if cpu::rolls_skip(profile, &mut rng) {
                debug!(room_id = %room.room_id, cpu_id = %cpu_id, "CPU sits this one out");
                continue;
            }
            let delay = cpu::buzz_delay(profile, &mut rng);
            let service = self.clone();
            let rid = room.room_id.clone();
            let sid = cpu_id.clone();
            room.timers
                .arm(&format!("cpu-buzz:{}", cpu_id), delay, async move {
                    service.buzz_in(&rid, &sid).await;
                });
        }
    }

    #[instrument(skip(self))]
    pub async fn buzz_in(self: &Arc<Self>, room_id: &str, socket_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::BuzzerOpen
            || !room.players.contains_key(socket_id)
            || room.buzzed.contains(socket_id)
        {
            return;
        }

        // First buzz wins: the window and every pending CPU buzz die with
        // the phase change.
        room.timers.cancel("buzzer");
        room.timers.cancel_prefix("cpu-buzz:");
        room.buzzed.insert(socket_id.to_string());
        room.answering = Some(socket_id.to_string());
        room.phase = Phase::PlayerAnswering;

        let name = room.players[socket_id].name.clone();
        info!(room_id = %room_id, socket_id = %socket_id, name = %name, "Buzzed in");
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                BUZZER_RESULT,
                serde_json::to_value(BuzzerResultPayload {
                    socket_id: socket_id.to_string(),
                    name,
                })
                .unwrap(),
            )
            .await;
        self.broadcast_phase(&room).await;

        self.arm_answer_window(&mut room);
        if room.players[socket_id].is_cpu {
            self.arm_cpu_answer(&room);
        }
    }

    fn arm_answer_window(self: &Arc<Self>, room: &mut JeopardyRoom) {
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("answer", ANSWER_WINDOW, async move {
            service.answer_timeout(&rid).await;
        });
    }

    fn arm_cpu_answer(self: &Arc<Self>, room: &JeopardyRoom) {
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("cpu-answer", CPU_THINK_DELAY, async move {
            service.cpu_submit_answer(&rid).await;
        });
    }

    async fn cpu_submit_answer(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let (cpu_id, answer) = {
            let room = room_arc.lock().await;
            if !matches!(room.phase, Phase::PlayerAnswering | Phase::DailyDoubleAnswer) {
                return;
            }
            let Some(cpu_id) = room.answering.clone() else {
                return;
            };
            let Some(player) = room.players.get(&cpu_id) else {
                return;
            };
            let Some(difficulty) = player.cpu_difficulty else {
                return;
            };
            let Some(clue) = room.current_clue.as_ref() else {
                return;
            };
            let answer =
                cpu::roll_answer(difficulty.profile(), &clue.answer, &mut rand::thread_rng());
            (cpu_id, answer)
        };
        self.submit_answer(room_id, &cpu_id, &answer).await;
    }

    #[instrument(skip(self, text))]
    pub async fn submit_answer(self: &Arc<Self>, room_id: &str, socket_id: &str, text: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !matches!(room.phase, Phase::PlayerAnswering | Phase::DailyDoubleAnswer)
            || room.answering.as_deref() != Some(socket_id)
        {
            return;
        }
        room.timers.cancel("answer");
        room.timers.cancel("cpu-answer");
        self.resolve_answer(&mut room, socket_id, text).await;
    }

    async fn answer_timeout(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if !matches!(room.phase, Phase::PlayerAnswering | Phase::DailyDoubleAnswer) {
            return;
        }
        let Some(answering) = room.answering.clone() else {
            return;
        };
        room.timers.cancel("cpu-answer");
        debug!(room_id = %room_id, socket_id = %answering, "Answer window expired");
        self.resolve_answer(&mut room, &answering, "").await;
    }

    /// Judge and score a submitted (or timed-out) answer, then route the
    /// state machine to its next phase.
    async fn resolve_answer(self: &Arc<Self>, room: &mut JeopardyRoom, socket_id: &str, text: &str) {
        let Some(clue) = room.current_clue.clone() else {
            return;
        };
        let judgement = check_answer(text, &clue.answer);
        let is_daily_double = room.phase == Phase::DailyDoubleAnswer;
        let stake = if is_daily_double {
            room.daily_double_wager.unwrap_or(clue.value)
        } else {
            clue.value
        };
        let delta = if judgement.correct { stake } else { -stake };

        let (name, new_score) = {
            let Some(player) = room.players.get_mut(socket_id) else {
                return;
            };
            player.score += delta;
            (player.name.clone(), player.score)
        };
        room.answering = None;

        info!(
            room_id = %room.room_id,
            socket_id = %socket_id,
            correct = judgement.correct,
            delta,
            "Answer judged"
        );

        let rebuzz =
            !is_daily_double && !judgement.correct && !room.unbuzzed_ids().is_empty();
        let reveal_answer = !rebuzz;

        room.phase = Phase::ShowingResult;
        if judgement.correct && !is_daily_double {
            room.controller = socket_id.to_string();
        }

        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                ANSWER_RESULT,
                serde_json::to_value(AnswerResultPayload {
                    socket_id: socket_id.to_string(),
                    name,
                    answer: text.to_string(),
                    correct: judgement.correct,
                    similarity: judgement.similarity,
                    score_change: delta,
                    new_score,
                    correct_answer: reveal_answer.then(|| clue.answer.clone()),
                    rebuzz,
                })
                .unwrap(),
            )
            .await;
        self.broadcast_scores(room).await;

        if rebuzz {
            self.arm_rebuzz(room);
            return;
        }

        let delay = if judgement.correct {
            CORRECT_REVEAL_DELAY
        } else {
            NO_TAKERS_REVEAL_DELAY
        };
        self.arm_settle(room, "reveal", delay);
    }

    fn arm_rebuzz(self: &Arc<Self>, room: &mut JeopardyRoom) {
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("rebuzz", REBUZZ_DELAY, async move {
            service.reopen_buzzer(&rid).await;
        });
    }

    async fn reopen_buzzer(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::ShowingResult || room.current_clue.is_none() {
            return;
        }
        self.begin_buzzer_window(&mut room).await;
    }

    async fn buzzer_timeout(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::BuzzerOpen {
            return;
        }
        room.timers.cancel_prefix("cpu-buzz:");
        self.reveal_and_settle(&mut room).await;
    }

    /// Nobody (left) to answer: show the answer and head back to clue
    /// selection after a beat.
    async fn reveal_and_settle(self: &Arc<Self>, room: &mut JeopardyRoom) {
        let answer = room
            .current_clue
            .as_ref()
            .map(|c| c.answer.clone())
            .unwrap_or_default();
        room.phase = Phase::ShowingResult;
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                BUZZER_EXPIRED,
                serde_json::to_value(BuzzerExpiredPayload {
                    correct_answer: answer,
                })
                .unwrap(),
            )
            .await;
        self.arm_settle(room, "reveal", NO_TAKERS_REVEAL_DELAY);
    }

    fn arm_settle(self: &Arc<Self>, room: &mut JeopardyRoom, name: &str, delay: Duration) {
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm(name, delay, async move {
            let Some(room_arc) = service.room(&rid).await else {
                return;
            };
            let mut room = room_arc.lock().await;
            if room.phase != Phase::ShowingResult {
                return;
            }
            service.settle_clue(&mut room).await;
        });
    }

    /// Clue finished: persist progress, then either pick the next clue,
    /// advance the round, or head into the final.
    async fn settle_clue(self: &Arc<Self>, room: &mut JeopardyRoom) {
        room.current_clue = None;
        room.buzzed.clear();
        room.answering = None;
        room.daily_double_wager = None;
        room.clues_answered += 1;
        self.persist_progress(room, false);

        if room.board_exhausted() {
            self.advance_round(room).await;
            return;
        }

        room.phase = Phase::SelectingClue;
        self.broadcast_phase(room).await;
        self.maybe_schedule_cpu_select(room);
    }

    async fn advance_round(self: &Arc<Self>, room: &mut JeopardyRoom) {
        match room.round {
            Round::Jeopardy => {
                room.round = Round::DoubleJeopardy;
                room.used_clues.clear();
                room.seed_missing_slots();
                // Lowest score picks first in the second round.
                if let Some(trailing) = room.ascending_score_order().first().cloned() {
                    room.controller = trailing;
                }
                info!(room_id = %room.room_id, "Entering double jeopardy");
                self.transport
                    .emit_to_room(
                        &room_channel(&room.room_id),
                        ROUND_CHANGE,
                        serde_json::to_value(RoundChangePayload {
                            round: room.round,
                            controller: room.controller.clone(),
                        })
                        .unwrap(),
                    )
                    .await;
                room.phase = Phase::SelectingClue;
                self.broadcast_phase(room).await;
                self.maybe_schedule_cpu_select(room);
            }
            Round::DoubleJeopardy => {
                if room.game.final_jeopardy.is_some() && !room.players.is_empty() {
                    self.enter_final(room).await;
                } else {
                    self.finish_game(room).await;
                }
            }
            Round::FinalJeopardy => {}
        }
    }

    // ---- final round -------------------------------------------------

    async fn enter_final(self: &Arc<Self>, room: &mut JeopardyRoom) {
        let Some(final_clue) = room.game.final_jeopardy.clone() else {
            self.finish_game(room).await;
            return;
        };
        room.round = Round::FinalJeopardy;
        room.phase = Phase::FinalCategory;
        info!(room_id = %room.room_id, "Entering final jeopardy");

        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                ROUND_CHANGE,
                serde_json::to_value(RoundChangePayload {
                    round: room.round,
                    controller: room.controller.clone(),
                })
                .unwrap(),
            )
            .await;
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                FINAL_CATEGORY,
                serde_json::to_value(FinalCategoryPayload {
                    category: final_clue.category,
                })
                .unwrap(),
            )
            .await;
        self.broadcast_phase(room).await;

        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers
            .arm("final-category", FINAL_CATEGORY_DELAY, async move {
                service.begin_final_wagers(&rid).await;
            });
    }

    async fn begin_final_wagers(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalCategory {
            return;
        }
        room.phase = Phase::FinalWager;
        self.broadcast_phase(&room).await;

        // CPU wagers land immediately; humans race the fan-in.
        let cpu_wagers: Vec<(String, i64)> = {
            let mut rng = rand::thread_rng();
            room.cpu_ids()
                .into_iter()
                .filter_map(|cpu_id| {
                    let player = room.players.get(&cpu_id)?;
                    let profile = player.cpu_difficulty?.profile();
                    Some((cpu_id, cpu::final_wager(profile, player.score, &mut rng)))
                })
                .collect()
        };
        for (cpu_id, wager) in cpu_wagers {
            room.final_state.wagers.insert(cpu_id.clone(), wager);
            self.broadcast_final_wager_submitted(&room, &cpu_id).await;
        }
        if room.final_state.wagers.len() >= room.players.len() {
            self.show_final_clue(&mut room).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn final_jeopardy_wager(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        wager: i64,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalWager
            || !room.players.contains_key(socket_id)
            || room.final_state.wagers.contains_key(socket_id)
        {
            return;
        }
        let cap = room.players[socket_id].score.max(0);
        let wager = wager.clamp(0, cap);
        room.final_state.wagers.insert(socket_id.to_string(), wager);
        self.broadcast_final_wager_submitted(&room, socket_id).await;

        if room.final_state.wagers.len() >= room.players.len() {
            self.show_final_clue(&mut room).await;
        }
    }

    async fn broadcast_final_wager_submitted(&self, room: &JeopardyRoom, socket_id: &str) {
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                FINAL_WAGER_SUBMITTED,
                serde_json::to_value(FinalWagerSubmittedPayload {
                    socket_id: socket_id.to_string(),
                    submitted: room.final_state.wagers.len(),
                    total: room.players.len(),
                })
                .unwrap(),
            )
            .await;
    }

    async fn show_final_clue(self: &Arc<Self>, room: &mut JeopardyRoom) {
        let Some(final_clue) = room.game.final_jeopardy.clone() else {
            self.finish_game(room).await;
            return;
        };
        room.phase = Phase::FinalClue;
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                FINAL_CLUE,
                serde_json::to_value(FinalCluePayload {
                    clue: final_clue.clue,
                })
                .unwrap(),
            )
            .await;
        self.broadcast_phase(room).await;

        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("final-clue", FINAL_CLUE_WINDOW, async move {
            service.final_clue_timeout(&rid).await;
        });

        for cpu_id in room.cpu_ids() {
            let service = self.clone();
            let rid = room.room_id.clone();
            let sid = cpu_id.clone();
            room.timers
                .arm(&format!("cpu-final:{}", cpu_id), CPU_THINK_DELAY, async move {
                    service.cpu_final_answer(&rid, &sid).await;
                });
        }
    }

    async fn cpu_final_answer(self: &Arc<Self>, room_id: &str, cpu_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalClue {
            return;
        }
        let Some(player) = room.players.get(cpu_id) else {
            return;
        };
        let Some(difficulty) = player.cpu_difficulty else {
            return;
        };
        let Some(final_clue) = room.game.final_jeopardy.clone() else {
            return;
        };
        let answer = cpu::roll_answer(
            difficulty.profile(),
            &final_clue.answer,
            &mut rand::thread_rng(),
        );
        self.record_final_answer(&mut room, cpu_id, answer).await;
    }

    #[instrument(skip(self, text))]
    pub async fn final_jeopardy_answer(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        text: String,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalClue || !room.players.contains_key(socket_id) {
            return;
        }
        self.record_final_answer(&mut room, socket_id, text).await;
    }

    async fn record_final_answer(
        self: &Arc<Self>,
        room: &mut JeopardyRoom,
        socket_id: &str,
        text: String,
    ) {
        if room.final_state.answers.contains_key(socket_id) {
            return;
        }
        room.final_state.answers.insert(socket_id.to_string(), text);
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                FINAL_ANSWER_SUBMITTED,
                serde_json::to_value(FinalAnswerSubmittedPayload {
                    socket_id: socket_id.to_string(),
                    submitted: room.final_state.answers.len(),
                    total: room.players.len(),
                })
                .unwrap(),
            )
            .await;

        if room.final_state.answers.len() >= room.players.len() {
            room.timers.cancel("final-clue");
            self.begin_final_reveals(room).await;
        }
    }

    async fn final_clue_timeout(self: &Arc<Self>, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalClue {
            return;
        }
        room.timers.cancel_prefix("cpu-final:");
        self.begin_final_reveals(&mut room).await;
    }

    /// Reveal lowest score first, one step every three seconds, then the
    /// final scoreboard.
    async fn begin_final_reveals(self: &Arc<Self>, room: &mut JeopardyRoom) {
        room.phase = Phase::FinalResults;
        room.final_state.reveal_order = room.ascending_score_order();
        room.final_state.revealed = 0;
        self.broadcast_phase(room).await;

        let count = room.final_state.reveal_order.len();
        for index in 0..count {
            let service = self.clone();
            let rid = room.room_id.clone();
            let delay = FINAL_REVEAL_SPACING * (index as u32 + 1);
            room.timers
                .arm(&format!("final-reveal:{}", index), delay, async move {
                    service.reveal_final(&rid, index).await;
                });
        }

        let service = self.clone();
        let rid = room.room_id.clone();
        let delay = FINAL_REVEAL_SPACING * (count as u32 + 1);
        room.timers.arm("gameover", delay, async move {
            let Some(room_arc) = service.room(&rid).await else {
                return;
            };
            let mut room = room_arc.lock().await;
            if room.phase != Phase::FinalResults {
                return;
            }
            service.finish_game(&mut room).await;
        });
    }

    async fn reveal_final(self: &Arc<Self>, room_id: &str, index: usize) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::FinalResults {
            return;
        }
        let Some(socket_id) = room.final_state.reveal_order.get(index).cloned() else {
            return;
        };
        let Some(final_clue) = room.game.final_jeopardy.clone() else {
            return;
        };
        let wager = room.final_state.wagers.get(&socket_id).copied().unwrap_or(0);
        let answer = room
            .final_state
            .answers
            .get(&socket_id)
            .cloned()
            .unwrap_or_default();
        room.final_state.revealed += 1;

        // Departed players are skipped but keep the reveal cadence.
        let Some(player) = room.players.get_mut(&socket_id) else {
            return;
        };
        let judgement = check_answer(&answer, &final_clue.answer);
        let delta = if judgement.correct { wager } else { -wager };
        player.score += delta;
        let payload = FinalRevealPayload {
            socket_id: socket_id.clone(),
            name: player.name.clone(),
            answer,
            wager,
            correct: judgement.correct,
            new_score: player.score,
        };

        self.transport
            .emit_to_room(
                &room_channel(room_id),
                FINAL_JEOPARDY_REVEAL,
                serde_json::to_value(payload).unwrap(),
            )
            .await;
        self.broadcast_scores(&room).await;
    }

    async fn finish_game(self: &Arc<Self>, room: &mut JeopardyRoom) {
        room.phase = Phase::GameOver;
        let winner = room
            .players
            .iter()
            .max_by_key(|(_, p)| p.score)
            .map(|(id, _)| id.clone());
        info!(room_id = %room.room_id, winner = ?winner, "Game over");

        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                GAME_OVER,
                serde_json::to_value(GameOverPayload {
                    winner,
                    final_scores: room.scores(),
                })
                .unwrap(),
            )
            .await;
        self.persist_progress(room, true);

        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("evict", GAME_OVER_EVICT_DELAY, async move {
            service.destroy_room(&rid).await;
        });
    }

    async fn destroy_room(self: &Arc<Self>, room_id: &str) {
        if let Some(room_arc) = self.rooms.write().await.remove(room_id) {
            let room = room_arc.lock().await;
            room.timers.cancel_all();
            info!(room_id = %room_id, "Trivia room evicted");
        }
    }

    // ---- daily double ------------------------------------------------

    #[instrument(skip(self))]
    pub async fn daily_double_wager(
        self: &Arc<Self>,
        room_id: &str,
        socket_id: &str,
        wager: i64,
    ) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let mut room = room_arc.lock().await;
        if room.phase != Phase::DailyDoubleWager || room.answering.as_deref() != Some(socket_id) {
            return;
        }
        let Some(clue) = room.current_clue.clone() else {
            return;
        };

        let score = room.players[socket_id].score;
        let clamped = clamp_daily_double_wager(room.round, score, wager);
        room.daily_double_wager = Some(clamped);
        room.phase = Phase::DailyDoubleAnswer;
        info!(room_id = %room_id, socket_id = %socket_id, wager = clamped, "Daily double wager locked");

        // The clue text is revealed only once the wager is in.
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                CLUE_SELECTED,
                serde_json::to_value(ClueSelectedPayload {
                    category: clue.category,
                    row: clue.row,
                    value: clamped,
                    clue: clue.clue.clone(),
                })
                .unwrap(),
            )
            .await;
        self.broadcast_phase(&room).await;

        self.arm_answer_window(&mut room);
        if room.players[socket_id].is_cpu {
            self.arm_cpu_answer(&room);
        }
    }

    fn maybe_schedule_cpu_wager(self: &Arc<Self>, room: &JeopardyRoom) {
        let Some(answering) = room.answering.clone() else {
            return;
        };
        let Some(player) = room.players.get(&answering) else {
            return;
        };
        let Some(difficulty) = player.cpu_difficulty else {
            return;
        };
        let profile = difficulty.profile();
        let score = player.score;
        let floor = room.round.wager_floor();
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("cpu-wager", CPU_THINK_DELAY, async move {
            let wager = cpu::daily_double_wager(profile, score, floor, &mut rand::thread_rng());
            service.daily_double_wager(&rid, &answering, wager).await;
        });
    }

    // ---- CPU clue selection -----------------------------------------

    fn maybe_schedule_cpu_select(self: &Arc<Self>, room: &JeopardyRoom) {
        if room.phase != Phase::SelectingClue {
            return;
        }
        let controller = room.controller.clone();
        match room.players.get(&controller) {
            Some(player) if player.is_cpu => {}
            _ => return,
        }
        let service = self.clone();
        let rid = room.room_id.clone();
        room.timers.arm("cpu-select", CPU_THINK_DELAY, async move {
            service.cpu_select_clue(&rid, &controller).await;
        });
    }

    async fn cpu_select_clue(self: &Arc<Self>, room_id: &str, cpu_id: &str) {
        let slot = {
            let Some(room_arc) = self.room(room_id).await else {
                return;
            };
            let room = room_arc.lock().await;
            if room.phase != Phase::SelectingClue || room.controller != cpu_id {
                return;
            }
            let mut open: Vec<(usize, u8)> = Vec::new();
            for category in 0..BOARD_CATEGORIES {
                for row in 1..=BOARD_ROWS {
                    if !room.used_clues.contains(&(category, row))
                        && room.board().clue_at(category, row).is_some()
                    {
                        open.push((category, row));
                    }
                }
            }
            open.choose(&mut rand::thread_rng()).copied()
        };
        if let Some((category, row)) = slot {
            self.select_clue(room_id, cpu_id, category, row).await;
        }
    }

    // ---- shared broadcast helpers -----------------------------------

    async fn broadcast_phase(&self, room: &JeopardyRoom) {
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                PHASE_CHANGE,
                serde_json::to_value(PhaseChangePayload {
                    phase: room.phase,
                    controller: Some(room.controller.clone()),
                    answering: room.answering.clone(),
                })
                .unwrap(),
            )
            .await;
    }

    async fn broadcast_scores(&self, room: &JeopardyRoom) {
        self.transport
            .emit_to_room(
                &room_channel(&room.room_id),
                SCORES_UPDATE,
                serde_json::to_value(ScoresUpdatePayload {
                    scores: room.scores(),
                })
                .unwrap(),
            )
            .await;
    }

    fn persist_progress(&self, room: &JeopardyRoom, completed: bool) {
        let store = self.store.clone();
        let game_id = room.game.game_id.clone();
        let clues_answered = room.clues_answered;
        let total = room.total_clues();
        let round = room.round.as_str();
        tokio::spawn(async move {
            if let Err(e) = store
                .save_jeopardy_progress(&game_id, clues_answered, total, round, completed)
                .await
            {
                warn!(game_id = %game_id, error = %e, "Failed to save trivia progress");
            }
        });
    }

    async fn send_room_state(&self, room_id: &str) {
        let Some(room_arc) = self.room(room_id).await else {
            return;
        };
        let room = room_arc.lock().await;
        let board = room.board();
        let payload = RoomStatePayload {
            room_id: room.room_id.clone(),
            game_id: room.game.game_id.clone(),
            phase: room.phase,
            round: room.round,
            players: room
                .players
                .iter()
                .map(|(id, p)| PlayerSummary {
                    socket_id: id.clone(),
                    name: p.name.clone(),
                    color: p.color.clone(),
                    score: p.score,
                    is_cpu: p.is_cpu,
                })
                .collect(),
            host: room.host.clone(),
            controller: room.controller.clone(),
            categories: board.categories.clone(),
            board: board
                .clues
                .iter()
                .map(|c| BoardSlot {
                    category: c.category,
                    row: c.row,
                    value: c.value,
                    used: room.used_clues.contains(&(c.category, c.row)),
                })
                .collect(),
        };
        self.transport
            .emit_to_room(
                &room_channel(room_id),
                ROOM_STATE,
                serde_json::to_value(payload).unwrap(),
            )
            .await;
    }

    /// Test/diagnostic access to a room's internals.
    pub async fn with_room<T>(
        &self,
        room_id: &str,
        f: impl FnOnce(&JeopardyRoom) -> T,
    ) -> Option<T> {
        let room_arc = self.room(room_id).await?;
        let room = room_arc.lock().await;
        Some(f(&room))
    }
}
