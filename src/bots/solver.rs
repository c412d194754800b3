//! Driver task for one synthetic solver.
//!
//! The driver owns no room state: every action goes through the
//! crossword service, which re-checks membership under the room lock.
//! Aborting the task (bot removal, room teardown) is always safe because
//! each step re-validates before mutating.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::crossword::CrosswordService;

use super::timing::{SolvePlan, MIN_INTERVAL_MS};

pub async fn run_bot(
    service: Arc<CrosswordService>,
    date: String,
    bot_id: String,
    plan: SolvePlan,
) {
    let mut rng = StdRng::from_entropy();
    debug!(
        date = %date,
        bot_id = %bot_id,
        words = plan.words.len(),
        total_ms = plan.total_ms,
        "Bot solve started"
    );

    for word in plan.words {
        if !service.bot_alive(&date, &bot_id).await {
            return;
        }

        // Wander phase: hop around at a fraction of the think pause
        // before settling on the word.
        let step = Duration::from_millis((word.think_ms / 3).max(MIN_INTERVAL_MS));
        sleep(step).await;
        while rng.gen::<f64>() < plan.wander_chance {
            if !service.bot_alive(&date, &bot_id).await {
                return;
            }
            let distance = rng.gen_range(2..=5) as f64;
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let d_row = (distance * angle.sin()).round() as i32;
            let d_col = (distance * angle.cos()).round() as i32;
            service.bot_hop(&date, &bot_id, d_row, d_col).await;
            sleep(step).await;
        }

        if let Some(first) = word.cells.first() {
            service
                .cursor_move(&date, &bot_id, first.0, first.1, word.direction)
                .await;
        }

        // Fill phase. A cell someone else already solved consumes its
        // slot without a pause.
        for (cell, pause_ms) in word.cells.iter().zip(&word.cell_ms) {
            match service.bot_cell_pending(&date, &bot_id, *cell).await {
                None => return,
                Some(false) => continue,
                Some(true) => {
                    sleep(Duration::from_millis(*pause_ms)).await;
                    service
                        .bot_fill(&date, &bot_id, *cell, word.direction)
                        .await;
                }
            }
        }
    }

    debug!(date = %date, bot_id = %bot_id, "Bot solve finished");
}
