use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::shared::AppError;

use super::models::{cell_key, JeopardyGame, Puzzle, PuzzleStateSnapshot, UserRecord};
use super::Store;

/// In-memory store. The default when no DATABASE_URL is configured, and
/// the backing for every test suite.
#[derive(Default)]
pub struct MemoryStore {
    puzzles: RwLock<HashMap<String, Puzzle>>,
    states: RwLock<HashMap<String, PuzzleStateSnapshot>>,
    timers: RwLock<HashMap<String, u64>>,
    users: RwLock<HashMap<String, UserRecord>>,
    games: RwLock<HashMap<String, JeopardyGame>>,
    progress: RwLock<HashMap<String, GameProgress>>,
}

#[derive(Debug, Clone)]
#[allow(dead_code)] // rollup fields are write-mostly, read by operators
struct GameProgress {
    clues_answered: u32,
    total_clues: u32,
    round: String,
    completed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed puzzle content (ingestion is outside the core).
    pub async fn insert_puzzle(&self, puzzle: Puzzle) {
        self.puzzles
            .write()
            .await
            .insert(puzzle.date.clone(), puzzle);
    }

    /// Seed trivia game content.
    pub async fn insert_jeopardy_game(&self, game: JeopardyGame) {
        self.games.write().await.insert(game.game_id.clone(), game);
    }

    /// Whether a game has been played to completion (used to pick unplayed
    /// games for new rooms).
    async fn is_completed(&self, game_id: &str) -> bool {
        self.progress
            .read()
            .await
            .get(game_id)
            .map(|p| p.completed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_puzzle(&self, date: &str) -> Result<Option<Puzzle>, AppError> {
        Ok(self.puzzles.read().await.get(date).cloned())
    }

    async fn has_puzzle(&self, date: &str) -> Result<bool, AppError> {
        Ok(self.puzzles.read().await.contains_key(date))
    }

    async fn get_state(&self, date: &str) -> Result<Option<PuzzleStateSnapshot>, AppError> {
        Ok(self.states.read().await.get(date).cloned())
    }

    async fn upsert_cell(
        &self,
        date: &str,
        row: u16,
        col: u16,
        letter: &str,
    ) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(date.to_string()).or_default();
        let key = cell_key(row, col);
        if letter.is_empty() {
            state.user_grid.remove(&key);
        } else {
            state.user_grid.insert(key, letter.to_string());
        }
        state.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn clear_state(&self, date: &str) -> Result<(), AppError> {
        self.states.write().await.remove(date);
        self.timers.write().await.remove(date);
        Ok(())
    }

    async fn upsert_cell_filler(
        &self,
        date: &str,
        row: u16,
        col: u16,
        filler: &str,
    ) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(date.to_string()).or_default();
        let key = cell_key(row, col);
        if filler.is_empty() {
            state.cell_fillers.remove(&key);
        } else {
            state.cell_fillers.insert(key, filler.to_string());
        }
        Ok(())
    }

    async fn get_cell_fillers(&self, date: &str) -> Result<HashMap<String, String>, AppError> {
        Ok(self
            .states
            .read()
            .await
            .get(date)
            .map(|s| s.cell_fillers.clone())
            .unwrap_or_default())
    }

    async fn add_points(&self, date: &str, name: &str, delta: i64) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(date.to_string()).or_default();
        *state.points.entry(name.to_string()).or_insert(0) += delta;
        Ok(())
    }

    async fn add_guess(&self, date: &str, name: &str, correct: bool) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(date.to_string()).or_default();
        let stats = state.guesses.entry(name.to_string()).or_default();
        stats.total += 1;
        if !correct {
            stats.incorrect += 1;
        }
        Ok(())
    }

    async fn get_timer(&self, date: &str) -> Result<u64, AppError> {
        Ok(self.timers.read().await.get(date).copied().unwrap_or(0))
    }

    async fn save_timer(&self, date: &str, seconds: u64) -> Result<(), AppError> {
        self.timers.write().await.insert(date.to_string(), seconds);
        Ok(())
    }

    async fn get_user(&self, device_id: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.read().await.get(device_id).cloned())
    }

    async fn create_user(
        &self,
        ip: &str,
        name: &str,
        color: &str,
        device_id: &str,
    ) -> Result<UserRecord, AppError> {
        let record = UserRecord {
            device_id: device_id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            ip: ip.to_string(),
            created_at: Utc::now(),
        };
        self.users
            .write()
            .await
            .insert(device_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_user_colors(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, String>, AppError> {
        let users = self.users.read().await;
        let mut colors = HashMap::new();
        for user in users.values() {
            if names.contains(&user.name) {
                colors.insert(user.name.clone(), user.color.clone());
            }
        }
        Ok(colors)
    }

    async fn get_user_count(&self) -> Result<u64, AppError> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn get_random_jeopardy_game(&self) -> Result<Option<JeopardyGame>, AppError> {
        let games = self.games.read().await;
        let mut candidates: Vec<&JeopardyGame> = Vec::new();
        for game in games.values() {
            if !self.is_completed(&game.game_id).await {
                candidates.push(game);
            }
        }
        // Fall back to any game when everything has been played.
        if candidates.is_empty() {
            candidates = games.values().collect();
        }
        Ok(candidates
            .choose(&mut rand::thread_rng())
            .map(|g| (*g).clone()))
    }

    async fn get_jeopardy_game(&self, game_id: &str) -> Result<Option<JeopardyGame>, AppError> {
        Ok(self.games.read().await.get(game_id).cloned())
    }

    async fn save_jeopardy_progress(
        &self,
        game_id: &str,
        clues_answered: u32,
        total_clues: u32,
        round: &str,
        completed: bool,
    ) -> Result<(), AppError> {
        debug!(
            game_id = %game_id,
            clues_answered,
            total_clues,
            round = %round,
            completed,
            "Saving trivia progress"
        );
        self.progress.write().await.insert(
            game_id.to_string(),
            GameProgress {
                clues_answered,
                total_clues,
                round: round.to_string(),
                completed,
            },
        );
        Ok(())
    }
}
