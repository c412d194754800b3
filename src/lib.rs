// Library crate for the parlor game server
// This file exposes the public API for integration tests

pub mod bots;
pub mod crossword;
pub mod jeopardy;
pub mod judge;
pub mod scheduler;
pub mod shared;
pub mod store;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use bots::{BotDifficulty, BotManager};
pub use crossword::CrosswordService;
pub use jeopardy::{CpuDifficulty, JeopardyService, Phase, Round};
pub use judge::check_answer;
pub use scheduler::TimerRegistry;
pub use shared::{AppError, AppState};
pub use store::{MemoryStore, PostgresStore, Store};
pub use websockets::{EventRouter, InMemoryTransport, Transport};
