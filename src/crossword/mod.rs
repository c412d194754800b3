pub mod events;
pub mod room;
pub mod service;

pub use room::{CrosswordRoom, Filler, FireState, Membership, SolveTimer};
pub use service::CrosswordService;
