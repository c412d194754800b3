use std::sync::Arc;

use parlor::store::MemoryStore;
use parlor::{BotManager, CrosswordService, JeopardyService, Transport};

use super::recording::RecordingTransport;

/// Wires the engines against an in-memory store and a recording
/// transport, the way main wires the real thing.
pub struct TestSetup {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub crossword: Arc<CrosswordService>,
    pub jeopardy: Arc<JeopardyService>,
    pub bots: Arc<BotManager>,
}

impl TestSetup {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let transport_dyn: Arc<dyn Transport> = transport.clone();
        let crossword = Arc::new(CrosswordService::new(store.clone(), transport_dyn.clone()));
        let jeopardy = Arc::new(JeopardyService::new(store.clone(), transport_dyn));
        let bots = Arc::new(BotManager::new(crossword.clone()));
        Self {
            store,
            transport,
            crossword,
            jeopardy,
            bots,
        }
    }
}

impl Default for TestSetup {
    fn default() -> Self {
        Self::new()
    }
}
