use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::shared::AppError;

use super::models::{
    cell_key, GuessStats, JeopardyGame, Puzzle, PuzzleStateSnapshot, UserRecord,
};
use super::Store;

/// PostgreSQL-backed store.
///
/// Expected tables:
///   puzzles(date TEXT PRIMARY KEY, doc JSONB)
///   puzzle_cells(date TEXT, row INT, col INT, letter TEXT, filler TEXT,
///                updated_at TIMESTAMPTZ, PRIMARY KEY(date, row, col))
///   puzzle_scores(date TEXT, name TEXT, points BIGINT,
///                 guesses_total INT, guesses_incorrect INT,
///                 PRIMARY KEY(date, name))
///   puzzle_timers(date TEXT PRIMARY KEY, seconds BIGINT)
///   users(device_id TEXT PRIMARY KEY, name TEXT, color TEXT, ip TEXT,
///         created_at TIMESTAMPTZ)
///   jeopardy_games(game_id TEXT PRIMARY KEY, doc JSONB)
///   jeopardy_progress(game_id TEXT PRIMARY KEY, clues_answered INT,
///                     total_clues INT, round TEXT, completed BOOL)
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_puzzle(doc: serde_json::Value) -> Result<Puzzle, AppError> {
        serde_json::from_value(doc)
            .map_err(|e| AppError::StoreError(format!("bad puzzle document: {}", e)))
    }

    fn decode_game(doc: serde_json::Value) -> Result<JeopardyGame, AppError> {
        serde_json::from_value(doc)
            .map_err(|e| AppError::StoreError(format!("bad game document: {}", e)))
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self))]
    async fn get_puzzle(&self, date: &str) -> Result<Option<Puzzle>, AppError> {
        let row = sqlx::query("SELECT doc FROM puzzles WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::decode_puzzle(row.get("doc"))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn has_puzzle(&self, date: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 AS present FROM puzzles WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn get_state(&self, date: &str) -> Result<Option<PuzzleStateSnapshot>, AppError> {
        let cells = sqlx::query(
            "SELECT row, col, letter, filler, updated_at FROM puzzle_cells WHERE date = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let scores = sqlx::query(
            "SELECT name, points, guesses_total, guesses_incorrect FROM puzzle_scores WHERE date = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        if cells.is_empty() && scores.is_empty() {
            return Ok(None);
        }

        let mut snapshot = PuzzleStateSnapshot::default();
        for row in cells {
            let r: i32 = row.get("row");
            let c: i32 = row.get("col");
            let key = cell_key(r as u16, c as u16);
            let letter: Option<String> = row.get("letter");
            if let Some(letter) = letter.filter(|l| !l.is_empty()) {
                snapshot.user_grid.insert(key.clone(), letter);
            }
            let filler: Option<String> = row.get("filler");
            if let Some(filler) = filler.filter(|f| !f.is_empty()) {
                snapshot.cell_fillers.insert(key, filler);
            }
            let updated: Option<chrono::DateTime<chrono::Utc>> = row.get("updated_at");
            if updated > snapshot.updated_at {
                snapshot.updated_at = updated;
            }
        }
        for row in scores {
            let name: String = row.get("name");
            let points: i64 = row.get("points");
            let total: i32 = row.get("guesses_total");
            let incorrect: i32 = row.get("guesses_incorrect");
            snapshot.points.insert(name.clone(), points);
            snapshot.guesses.insert(
                name,
                GuessStats {
                    total: total as u32,
                    incorrect: incorrect as u32,
                },
            );
        }

        Ok(Some(snapshot))
    }

    #[instrument(skip(self))]
    async fn upsert_cell(
        &self,
        date: &str,
        row: u16,
        col: u16,
        letter: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO puzzle_cells (date, row, col, letter, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (date, row, col) DO UPDATE SET letter = $4, updated_at = now()",
        )
        .bind(date)
        .bind(row as i32)
        .bind(col as i32)
        .bind(letter)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, date = %date, "Failed to upsert cell");
            AppError::StoreError(e.to_string())
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_state(&self, date: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM puzzle_cells WHERE date = $1")
            .bind(date)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM puzzle_scores WHERE date = $1")
            .bind(date)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM puzzle_timers WHERE date = $1")
            .bind(date)
            .execute(&self.pool)
            .await?;
        debug!(date = %date, "Cleared persisted puzzle state");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_cell_filler(
        &self,
        date: &str,
        row: u16,
        col: u16,
        filler: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO puzzle_cells (date, row, col, filler, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (date, row, col) DO UPDATE SET filler = $4, updated_at = now()",
        )
        .bind(date)
        .bind(row as i32)
        .bind(col as i32)
        .bind(filler)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, date = %date, "Failed to upsert cell filler");
            AppError::StoreError(e.to_string())
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_cell_fillers(&self, date: &str) -> Result<HashMap<String, String>, AppError> {
        let rows = sqlx::query(
            "SELECT row, col, filler FROM puzzle_cells WHERE date = $1 AND filler IS NOT NULL",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let mut fillers = HashMap::new();
        for row in rows {
            let r: i32 = row.get("row");
            let c: i32 = row.get("col");
            let filler: String = row.get("filler");
            if !filler.is_empty() {
                fillers.insert(cell_key(r as u16, c as u16), filler);
            }
        }
        Ok(fillers)
    }

    #[instrument(skip(self))]
    async fn add_points(&self, date: &str, name: &str, delta: i64) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO puzzle_scores (date, name, points, guesses_total, guesses_incorrect) \
             VALUES ($1, $2, $3, 0, 0) \
             ON CONFLICT (date, name) DO UPDATE SET points = puzzle_scores.points + $3",
        )
        .bind(date)
        .bind(name)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, date = %date, name = %name, "Failed to add points");
            AppError::StoreError(e.to_string())
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_guess(&self, date: &str, name: &str, correct: bool) -> Result<(), AppError> {
        let incorrect = i32::from(!correct);
        sqlx::query(
            "INSERT INTO puzzle_scores (date, name, points, guesses_total, guesses_incorrect) \
             VALUES ($1, $2, 0, 1, $3) \
             ON CONFLICT (date, name) DO UPDATE SET \
               guesses_total = puzzle_scores.guesses_total + 1, \
               guesses_incorrect = puzzle_scores.guesses_incorrect + $3",
        )
        .bind(date)
        .bind(name)
        .bind(incorrect)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, date = %date, name = %name, "Failed to add guess");
            AppError::StoreError(e.to_string())
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_timer(&self, date: &str) -> Result<u64, AppError> {
        let row = sqlx::query("SELECT seconds FROM puzzle_timers WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("seconds") as u64).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn save_timer(&self, date: &str, seconds: u64) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO puzzle_timers (date, seconds) VALUES ($1, $2) \
             ON CONFLICT (date) DO UPDATE SET seconds = $2",
        )
        .bind(date)
        .bind(seconds as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, device_id: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query(
            "SELECT device_id, name, color, ip, created_at FROM users WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserRecord {
            device_id: row.get("device_id"),
            name: row.get("name"),
            color: row.get("color"),
            ip: row.get("ip"),
            created_at: row.get("created_at"),
        }))
    }

    #[instrument(skip(self))]
    async fn create_user(
        &self,
        ip: &str,
        name: &str,
        color: &str,
        device_id: &str,
    ) -> Result<UserRecord, AppError> {
        let row = sqlx::query(
            "INSERT INTO users (device_id, name, color, ip, created_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (device_id) DO UPDATE SET name = $2, color = $3 \
             RETURNING device_id, name, color, ip, created_at",
        )
        .bind(device_id)
        .bind(name)
        .bind(color)
        .bind(ip)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, device_id = %device_id, "Failed to create user");
            AppError::StoreError(e.to_string())
        })?;

        Ok(UserRecord {
            device_id: row.get("device_id"),
            name: row.get("name"),
            color: row.get("color"),
            ip: row.get("ip"),
            created_at: row.get("created_at"),
        })
    }

    #[instrument(skip(self))]
    async fn get_user_colors(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, String>, AppError> {
        let rows = sqlx::query("SELECT name, color FROM users WHERE name = ANY($1)")
            .bind(names)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("name"), row.get("color")))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_user_count(&self) -> Result<u64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    #[instrument(skip(self))]
    async fn get_random_jeopardy_game(&self) -> Result<Option<JeopardyGame>, AppError> {
        // Prefer games nobody has finished; fall back to any game.
        let row = sqlx::query(
            "SELECT g.doc FROM jeopardy_games g \
             LEFT JOIN jeopardy_progress p ON p.game_id = g.game_id \
             WHERE NOT COALESCE(p.completed, FALSE) \
             ORDER BY random() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => Some(row),
            None => {
                sqlx::query("SELECT doc FROM jeopardy_games ORDER BY random() LIMIT 1")
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        match row {
            Some(row) => Ok(Some(Self::decode_game(row.get("doc"))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn get_jeopardy_game(&self, game_id: &str) -> Result<Option<JeopardyGame>, AppError> {
        let row = sqlx::query("SELECT doc FROM jeopardy_games WHERE game_id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::decode_game(row.get("doc"))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn save_jeopardy_progress(
        &self,
        game_id: &str,
        clues_answered: u32,
        total_clues: u32,
        round: &str,
        completed: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO jeopardy_progress (game_id, clues_answered, total_clues, round, completed) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (game_id) DO UPDATE SET \
               clues_answered = $2, total_clues = $3, round = $4, completed = $5",
        )
        .bind(game_id)
        .bind(clues_answered as i32)
        .bind(total_clues as i32)
        .bind(round)
        .bind(completed)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id = %game_id, "Failed to save trivia progress");
            AppError::StoreError(e.to_string())
        })?;
        Ok(())
    }
}
