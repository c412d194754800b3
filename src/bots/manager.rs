use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::crossword::events::BotSummary;
use crate::crossword::CrosswordService;

use super::solver::run_bot;
use super::timing::{build_plan, BotDifficulty};

pub const MAX_BOTS_PER_ROOM: usize = 4;

/// Seats, starts, and removes synthetic solvers. Bot memberships and
/// driver handles live inside the crossword room so eviction is atomic
/// with the room's other state.
pub struct BotManager {
    crossword: Arc<CrosswordService>,
}

impl BotManager {
    pub fn new(crossword: Arc<CrosswordService>) -> Self {
        Self { crossword }
    }

    #[instrument(skip(self))]
    pub async fn add_bot(&self, date: &str, difficulty: BotDifficulty) -> Option<BotSummary> {
        if self.crossword.list_bots(date).await.len() >= MAX_BOTS_PER_ROOM {
            info!(date = %date, "Bot limit reached");
            return None;
        }
        self.crossword.add_bot(date, difficulty).await
    }

    #[instrument(skip(self))]
    pub async fn remove_bot(&self, date: &str, bot_id: &str) {
        self.crossword.remove_bot(date, bot_id).await;
    }

    /// Launch every seated-but-idle bot. Each gets its own plan; seat
    /// index staggers their starting words.
    #[instrument(skip(self))]
    pub async fn start_bots(&self, date: &str) {
        let idle = self.crossword.idle_bots(date).await;
        for (seat_index, (bot_id, difficulty, puzzle)) in idle.into_iter().enumerate() {
            let plan = {
                let mut rng = StdRng::from_entropy();
                build_plan(&puzzle, date, difficulty, seat_index, &mut rng)
            };
            info!(
                date = %date,
                bot_id = %bot_id,
                ?difficulty,
                total_ms = plan.total_ms,
                "Starting bot solver"
            );
            let handle = tokio::spawn(run_bot(
                self.crossword.clone(),
                date.to_string(),
                bot_id.clone(),
                plan,
            ));
            self.crossword.attach_bot_driver(date, &bot_id, handle).await;
        }
    }

    pub async fn list_bots(&self, date: &str) -> Vec<BotSummary> {
        self.crossword.list_bots(date).await
    }
}
