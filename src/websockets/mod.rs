pub mod connection_manager;
pub mod handler;
pub mod messages;
pub mod router;

pub use connection_manager::{InMemoryTransport, Transport};
pub use handler::websocket_handler;
pub use messages::{ClientMessage, ServerMessage};
pub use router::EventRouter;
