#![allow(dead_code)]

pub mod fixtures;
pub mod recording;
pub mod setup;

#[allow(unused_imports)]
pub use fixtures::{short_game, tiny_game, tiny_puzzle};
#[allow(unused_imports)]
pub use recording::RecordingTransport;
#[allow(unused_imports)]
pub use setup::TestSetup;
