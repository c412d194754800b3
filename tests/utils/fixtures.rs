use std::collections::HashMap;

use parlor::store::models::{
    BoardClue, BoardRound, Clue, FinalRound, JeopardyGame, Puzzle,
};

/// 3x3 fully-open grid:
///
/// ```text
///   C A T
///   O R E
///   B I N
/// ```
///
/// Across: CAT / ORE / BIN. Down: COB / ARI / TEN. Six short words make
/// fire streaks easy to trigger in tests.
pub fn tiny_puzzle(date: &str) -> Puzzle {
    let across = vec![
        clue(1, 0, 0, "Feline", "CAT"),
        clue(4, 1, 0, "Mineral source", "ORE"),
        clue(5, 2, 0, "Waste basket", "BIN"),
    ];
    let down = vec![
        clue(1, 0, 0, "Corn core", "COB"),
        clue(2, 0, 1, "Ram constellation, briefly", "ARI"),
        clue(3, 0, 2, "___-spot", "TEN"),
    ];
    Puzzle {
        date: date.to_string(),
        rows: 3,
        cols: 3,
        grid: vec![
            vec!["C".into(), "A".into(), "T".into()],
            vec!["O".into(), "R".into(), "E".into()],
            vec!["B".into(), "I".into(), "N".into()],
        ],
        rebus: HashMap::new(),
        across,
        down,
    }
}

fn clue(number: u32, row: u16, col: u16, text: &str, answer: &str) -> Clue {
    Clue {
        number,
        row,
        col,
        clue: text.to_string(),
        answer: answer.to_string(),
    }
}

/// Full 6x5 boards for both rounds with a daily double at (2,3) and
/// (4,1), plus a final clue.
pub fn tiny_game(game_id: &str) -> JeopardyGame {
    JeopardyGame {
        game_id: game_id.to_string(),
        show_number: 4242,
        air_date: "2019-11-11".to_string(),
        season: Some(36),
        jeopardy_round: board(200, Some((2, 3))),
        double_jeopardy_round: board(400, Some((4, 1))),
        final_jeopardy: Some(final_round()),
    }
}

/// One clue per round: the fastest path through every round transition.
pub fn short_game(game_id: &str) -> JeopardyGame {
    let single = |value: i64| BoardRound {
        categories: (0..6).map(|i| format!("CATEGORY {}", i + 1)).collect(),
        clues: vec![BoardClue {
            category: 0,
            row: 1,
            value,
            clue: "The only clue".to_string(),
            answer: "solo".to_string(),
            daily_double: false,
        }],
    };
    JeopardyGame {
        game_id: game_id.to_string(),
        show_number: 1,
        air_date: "2019-11-11".to_string(),
        season: Some(36),
        jeopardy_round: single(200),
        double_jeopardy_round: single(400),
        final_jeopardy: Some(final_round()),
    }
}

fn final_round() -> FinalRound {
    FinalRound {
        category: "WORLD CAPITALS".to_string(),
        clue: "This city on the Seine".to_string(),
        answer: "Paris".to_string(),
    }
}

fn board(base_value: i64, daily_double: Option<(usize, u8)>) -> BoardRound {
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
                daily_double: daily_double == Some((category, row)),
            });
        }
    }
    BoardRound { categories, clues }
}
