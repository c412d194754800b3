pub mod cpu;
pub mod events;
pub mod room;
pub mod service;

pub use cpu::CpuDifficulty;
pub use room::{JeopardyRoom, Phase, Round};
pub use service::JeopardyService;

#[cfg(test)]
pub mod test_fixtures {
    use crate::store::models::{BoardClue, BoardRound, FinalRound, JeopardyGame};

    /// A full 6x5 board for both rounds, with one daily double in each,
    /// plus a final clue. Answers are predictable for assertions.
    pub fn tiny_game(game_id: &str) -> JeopardyGame {
        JeopardyGame {
            game_id: game_id.to_string(),
            show_number: 4242,
            air_date: "2019-11-11".to_string(),
            season: Some(36),
            jeopardy_round: board(200, (2, 3)),
            double_jeopardy_round: board(400, (4, 1)),
            final_jeopardy: Some(FinalRound {
                category: "WORLD CAPITALS".to_string(),
                clue: "This city on the Seine".to_string(),
                answer: "Paris".to_string(),
            }),
        }
    }

    fn board(base_value: i64, daily_double: (usize, u8)) -> BoardRound {
        let categories: Vec<String> = (0..6).map(|i| format!("CATEGORY {}", i + 1)).collect();
        let mut clues = Vec::new();
        for category in 0..6 {
            for row in 1..=5u8 {
                clues.push(BoardClue {
                    category,
                    row,
                    value: base_value * row as i64,
                    clue: format!("Clue {}-{}", category, row),
                    answer: format!("answer {} {}", category, row),
                    daily_double: (category, row) == daily_double,
                });
            }
        }
        BoardRound { categories, clues }
    }
}
