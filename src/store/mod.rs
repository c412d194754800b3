pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::shared::AppError;
use models::{JeopardyGame, Puzzle, PuzzleStateSnapshot, UserRecord};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Narrow persistence façade. The engines treat this as a slow, fallible
/// key/value-like store; every mutation is additive per key, so no
/// transaction boundaries are needed.
#[async_trait]
pub trait Store: Send + Sync {
    // Puzzle content
    async fn get_puzzle(&self, date: &str) -> Result<Option<Puzzle>, AppError>;
    async fn has_puzzle(&self, date: &str) -> Result<bool, AppError>;

    // Shared crossword state
    async fn get_state(&self, date: &str) -> Result<Option<PuzzleStateSnapshot>, AppError>;
    async fn upsert_cell(&self, date: &str, row: u16, col: u16, letter: &str)
        -> Result<(), AppError>;
    async fn clear_state(&self, date: &str) -> Result<(), AppError>;
    async fn upsert_cell_filler(
        &self,
        date: &str,
        row: u16,
        col: u16,
        filler: &str,
    ) -> Result<(), AppError>;
    async fn get_cell_fillers(&self, date: &str) -> Result<HashMap<String, String>, AppError>;

    // Scoring
    async fn add_points(&self, date: &str, name: &str, delta: i64) -> Result<(), AppError>;
    async fn add_guess(&self, date: &str, name: &str, correct: bool) -> Result<(), AppError>;

    // Solve timer
    async fn get_timer(&self, date: &str) -> Result<u64, AppError>;
    async fn save_timer(&self, date: &str, seconds: u64) -> Result<(), AppError>;

    // Users
    async fn get_user(&self, device_id: &str) -> Result<Option<UserRecord>, AppError>;
    async fn create_user(
        &self,
        ip: &str,
        name: &str,
        color: &str,
        device_id: &str,
    ) -> Result<UserRecord, AppError>;
    async fn get_user_colors(&self, names: &[String])
        -> Result<HashMap<String, String>, AppError>;
    async fn get_user_count(&self) -> Result<u64, AppError>;

    // Trivia
    async fn get_random_jeopardy_game(&self) -> Result<Option<JeopardyGame>, AppError>;
    async fn get_jeopardy_game(&self, game_id: &str) -> Result<Option<JeopardyGame>, AppError>;
    async fn save_jeopardy_progress(
        &self,
        game_id: &str,
        clues_answered: u32,
        total_clues: u32,
        round: &str,
        completed: bool,
    ) -> Result<(), AppError>;
}
