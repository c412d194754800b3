mod utils;

use std::time::Duration;

use parlor::crossword::Filler;
use parlor::Store;
use utils::{tiny_puzzle, TestSetup};

const DATE: &str = "2024-03-04";

async fn setup_with_puzzle() -> TestSetup {
    let setup = TestSetup::new();
    setup.store.insert_puzzle(tiny_puzzle(DATE)).await;
    setup
}

/// Let fire-and-forget store writes drain.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn join_sends_snapshot_and_starts_timer() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    let snapshots = setup.transport.socket_payloads("s1", "room-state");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["date"], DATE);
    assert_eq!(snapshots[0]["members"].as_array().unwrap().len(), 1);

    let timer = setup.transport.socket_payloads("s1", "timer-sync");
    assert_eq!(timer.len(), 1);
    assert_eq!(timer[0]["running"], true);

    let running = setup
        .crossword
        .with_room(DATE, |room| room.timer.running())
        .await
        .unwrap();
    assert!(running);
}

#[tokio::test]
async fn join_unknown_puzzle_replies_with_error() {
    let setup = TestSetup::new();
    setup
        .crossword
        .join("2030-01-01", "s1", "ada".to_string(), None)
        .await;

    let replies = setup.transport.socket_payloads("s1", "room-state");
    assert_eq!(replies.len(), 1);
    assert!(replies[0]["error"].is_string());
    assert!(!setup.crossword.room_exists("2030-01-01").await);
}

#[tokio::test]
async fn correct_fill_scores_and_counts_guess() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    setup.crossword.cell_update(DATE, "s1", 0, 0, "C").await;

    let updates = setup.transport.payloads_named("cell-updated");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["scoreChange"], 10);
    assert_eq!(updates[0]["guessCorrect"], true);
    assert_eq!(updates[0]["wordBonus"], 0);

    let (points, guesses) = setup
        .crossword
        .with_room(DATE, |room| {
            (room.points["ada"], room.guesses["ada"])
        })
        .await
        .unwrap();
    assert_eq!(points, 10);
    assert_eq!((guesses.total, guesses.incorrect), (1, 0));

    settle().await;
    let state = setup.store.get_state(DATE).await.unwrap().unwrap();
    assert_eq!(state.points["ada"], 10);
    assert_eq!(state.user_grid["0,0"], "C");
    assert_eq!(state.cell_fillers["0,0"], "ada");
}

#[tokio::test]
async fn wrong_fill_penalizes_thirty() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    setup.crossword.cell_update(DATE, "s1", 0, 0, "X").await;

    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["scoreChange"], -30);
    assert_eq!(update["guessCorrect"], false);

    let guesses = setup
        .crossword
        .with_room(DATE, |room| room.guesses["ada"])
        .await
        .unwrap();
    assert_eq!((guesses.total, guesses.incorrect), (1, 1));
}

#[tokio::test]
async fn word_completion_pays_bonus() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    setup.crossword.cell_update(DATE, "s1", 0, 0, "C").await;
    setup.crossword.cell_update(DATE, "s1", 0, 1, "A").await;
    setup.crossword.cell_update(DATE, "s1", 0, 2, "T").await;

    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["scoreChange"], 10);
    assert_eq!(update["wordBonus"], 50);

    let points = setup
        .crossword
        .with_room(DATE, |room| room.points["ada"])
        .await
        .unwrap();
    assert_eq!(points, 80);
}

#[tokio::test]
async fn three_words_ignite_fire_and_multiply_scoring() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    // CAT, ORE, then COB completes on the seventh fill.
    for (row, col, letter) in [
        (0, 0, "C"),
        (0, 1, "A"),
        (0, 2, "T"),
        (1, 0, "O"),
        (1, 1, "R"),
        (1, 2, "E"),
        (2, 0, "B"),
    ] {
        setup.crossword.cell_update(DATE, "s1", row, col, letter).await;
    }

    let fire_updates = setup.transport.payloads_named("fire-update");
    assert!(!fire_updates.is_empty());
    assert_eq!(fire_updates[0]["type"], "started");
    assert_eq!(fire_updates[0]["multiplier"], 1.5);

    let (on_fire, expiry_armed) = setup
        .crossword
        .with_room(DATE, |room| {
            (
                room.members["s1"].fire.on_fire,
                room.timers.armed("fire:s1"),
            )
        })
        .await
        .unwrap();
    assert!(on_fire);
    assert!(expiry_armed);

    // Next correct fill scores 10 * 1.5 and extends the streak.
    setup.crossword.cell_update(DATE, "s1", 2, 1, "I").await;
    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["scoreChange"], 15);
    assert_eq!(update["wordBonus"], 75);
    assert_eq!(
        setup.transport.last_named("fire-update").unwrap()["type"],
        "extended"
    );
}

#[tokio::test]
async fn wrong_fill_breaks_fire() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    for (row, col, letter) in [
        (0, 0, "C"),
        (0, 1, "A"),
        (0, 2, "T"),
        (1, 0, "O"),
        (1, 1, "R"),
        (1, 2, "E"),
        (2, 0, "B"),
    ] {
        setup.crossword.cell_update(DATE, "s1", row, col, letter).await;
    }

    setup.crossword.cell_update(DATE, "s1", 2, 1, "X").await;
    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["scoreChange"], -30);
    assert_eq!(update["fireEvent"], "broken");

    let (on_fire, expiry_armed) = setup
        .crossword
        .with_room(DATE, |room| {
            (
                room.members["s1"].fire.on_fire,
                room.timers.armed("fire:s1"),
            )
        })
        .await
        .unwrap();
    assert!(!on_fire);
    assert!(!expiry_armed);
}

#[tokio::test]
async fn finishing_the_grid_awards_last_square_bonus_once() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    for (row, col, letter) in [
        (0, 0, "C"),
        (0, 1, "A"),
        (0, 2, "T"),
        (1, 0, "O"),
        (1, 1, "R"),
        (1, 2, "E"),
        (2, 0, "B"),
        (2, 1, "I"),
        (2, 2, "N"),
    ] {
        setup.crossword.cell_update(DATE, "s1", row, col, letter).await;
    }

    let updates = setup.transport.payloads_named("cell-updated");
    let bonuses: Vec<i64> = updates
        .iter()
        .map(|u| u["lastSquareBonus"].as_i64().unwrap())
        .filter(|b| *b > 0)
        .collect();
    assert_eq!(bonuses, vec![250]);

    let last = updates.last().unwrap();
    // Double completion (BIN + TEN) on fire at 1.5x: 250 * 1.5.
    assert_eq!(last["wordBonus"], 375);
    assert_eq!(last["scoreChange"], 15);

    let (completed, running) = setup
        .crossword
        .with_room(DATE, |room| (room.completed, room.timer.running()))
        .await
        .unwrap();
    assert!(completed);
    assert!(!running);

    // Re-typing a correct cell after completion must not re-award.
    setup.transport.clear();
    setup.crossword.cell_update(DATE, "s1", 0, 0, "C").await;
    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["lastSquareBonus"], 0);
}

#[tokio::test]
async fn hint_vote_consensus_reveals_cells() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;
    setup
        .crossword
        .join(DATE, "s2", "bob".to_string(), None)
        .await;

    setup.crossword.hint_vote(DATE, "s1").await;
    let vote = setup.transport.last_named("hint-vote-update").unwrap();
    assert_eq!(vote["votes"], 1);
    assert_eq!(vote["total"], 2);
    assert_eq!(setup.transport.count_named("hint-reveal"), 0);

    setup.crossword.hint_vote(DATE, "s2").await;
    let reveal = setup.transport.last_named("hint-reveal").unwrap();
    let cells = reveal["cells"].as_array().unwrap();
    assert!(!cells.is_empty() && cells.len() <= 5);
    for cell in cells {
        assert_eq!(cell["filledBy"], "(hint)");
    }

    let (hint_count, votes_left) = setup
        .crossword
        .with_room(DATE, |room| {
            let hints = room
                .fillers
                .values()
                .filter(|f| **f == Filler::Hint)
                .count();
            (hints, room.hints.votes.len())
        })
        .await
        .unwrap();
    assert_eq!(hint_count, cells.len());
    assert_eq!(votes_left, 0);

    // Hint cells never score.
    setup.transport.clear();
    let hinted = cells[0].clone();
    let (row, col) = (
        hinted["row"].as_u64().unwrap() as u16,
        hinted["col"].as_u64().unwrap() as u16,
    );
    let letter = hinted["value"].as_str().unwrap().to_string();
    setup
        .crossword
        .cell_update(DATE, "s1", row, col, &letter)
        .await;
    let update = setup.transport.last_named("cell-updated").unwrap();
    assert_eq!(update["scoreChange"], 0);
    assert!(update["guessCorrect"].is_null());
}

#[tokio::test]
async fn hint_available_broadcasts_once() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;

    setup.crossword.hint_available(DATE, "s1").await;
    setup.crossword.hint_available(DATE, "s1").await;
    setup.crossword.hint_available(DATE, "s1").await;
    assert_eq!(setup.transport.count_named("hint-available"), 1);
}

#[tokio::test]
async fn pausing_all_humans_stops_the_clock() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;
    setup
        .crossword
        .join(DATE, "s2", "bob".to_string(), None)
        .await;

    setup.crossword.pause(DATE, "s1").await;
    let running = setup
        .crossword
        .with_room(DATE, |room| room.timer.running())
        .await
        .unwrap();
    assert!(running, "one unpaused human keeps the clock going");

    setup.crossword.pause(DATE, "s2").await;
    let running = setup
        .crossword
        .with_room(DATE, |room| room.timer.running())
        .await
        .unwrap();
    assert!(!running);

    setup.transport.clear();
    setup.crossword.resume(DATE, "s1").await;
    let running = setup
        .crossword
        .with_room(DATE, |room| room.timer.running())
        .await
        .unwrap();
    assert!(running);
    assert!(setup.transport.count_named("timer-sync") >= 1);
}

#[tokio::test]
async fn clear_puzzle_resets_everything() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;
    setup.crossword.cell_update(DATE, "s1", 0, 0, "C").await;
    settle().await;

    setup.crossword.clear_puzzle(DATE, "s1").await;
    settle().await;

    assert!(setup.transport.count_named("puzzle-cleared") >= 1);
    let (grid_len, points_len) = setup
        .crossword
        .with_room(DATE, |room| (room.grid.len(), room.points.len()))
        .await
        .unwrap();
    assert_eq!(grid_len, 0);
    assert_eq!(points_len, 0);
    assert!(setup.store.get_state(DATE).await.unwrap().is_none());
}

#[tokio::test]
async fn last_human_leaving_destroys_room_and_persists_timer() {
    let setup = setup_with_puzzle().await;
    setup
        .crossword
        .join(DATE, "s1", "ada".to_string(), None)
        .await;
    setup.crossword.cell_update(DATE, "s1", 0, 0, "C").await;

    setup.crossword.leave(DATE, "s1").await;
    settle().await;

    assert!(!setup.crossword.room_exists(DATE).await);
    // The shared grid survives the room.
    let state = setup.store.get_state(DATE).await.unwrap().unwrap();
    assert_eq!(state.user_grid["0,0"], "C");
}

#[tokio::test]
async fn members_get_distinct_palette_colors() {
    let setup = setup_with_puzzle().await;
    for (sid, name) in [("s1", "ada"), ("s2", "bob"), ("s3", "cal")] {
        setup
            .crossword
            .join(DATE, sid, name.to_string(), None)
            .await;
    }
    let colors = setup
        .crossword
        .with_room(DATE, |room| {
            room.members
                .values()
                .map(|m| m.color.clone())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();
    let unique: std::collections::HashSet<_> = colors.iter().collect();
    assert_eq!(unique.len(), 3);
}
