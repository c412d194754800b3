use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::trace;

use super::messages::ServerMessage;

/// Namespaced publish/subscribe over client-bound sockets. Engines talk to
/// clients only through this trait; bots have no registered sender, so
/// emissions addressed to them fall through silently.
///
/// Ordering within a single room from a single emitter is preserved by the
/// per-socket unbounded channels; cross-socket ordering is whatever the
/// server-side call sequence produced.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn register(&self, socket_id: &str, sender: mpsc::UnboundedSender<String>);
    async fn unregister(&self, socket_id: &str);

    async fn join(&self, room: &str, socket_id: &str);
    async fn leave(&self, room: &str, socket_id: &str);
    async fn leave_all(&self, socket_id: &str);
    async fn members(&self, room: &str) -> Vec<String>;

    async fn emit_to_room(&self, room: &str, event: &str, payload: Value);
    async fn emit_to_room_except(&self, room: &str, skip: &str, event: &str, payload: Value);
    async fn emit_to_socket(&self, socket_id: &str, event: &str, payload: Value);
}

/// Production transport: socket id -> outbound channel, room -> socket ids.
#[derive(Default)]
pub struct InMemoryTransport {
    connections: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<String>>>>,
    rooms: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send(&self, socket_id: &str, message: &str) {
        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(socket_id) {
            let _ = sender.send(message.to_string());
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn register(&self, socket_id: &str, sender: mpsc::UnboundedSender<String>) {
        self.connections
            .write()
            .await
            .insert(socket_id.to_string(), sender);
    }

    async fn unregister(&self, socket_id: &str) {
        self.connections.write().await.remove(socket_id);
        self.leave_all(socket_id).await;
    }

    async fn join(&self, room: &str, socket_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(socket_id.to_string());
        trace!(room = %room, socket_id = %socket_id, "Socket joined room");
    }

    async fn leave(&self, room: &str, socket_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(socket_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    async fn leave_all(&self, socket_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(socket_id);
            !members.is_empty()
        });
    }

    async fn members(&self, room: &str) -> Vec<String> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn emit_to_room(&self, room: &str, event: &str, payload: Value) {
        let message = ServerMessage::encode(event, payload);
        let members = self.members(room).await;
        for socket_id in members {
            self.send(&socket_id, &message).await;
        }
    }

    async fn emit_to_room_except(&self, room: &str, skip: &str, event: &str, payload: Value) {
        let message = ServerMessage::encode(event, payload);
        let members = self.members(room).await;
        for socket_id in members {
            if socket_id != skip {
                self.send(&socket_id, &message).await;
            }
        }
    }

    async fn emit_to_socket(&self, socket_id: &str, event: &str, payload: Value) {
        let message = ServerMessage::encode(event, payload);
        self.send(socket_id, &message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn room_membership_tracks_joins_and_leaves() {
        let transport = InMemoryTransport::new();
        transport.join("r1", "a").await;
        transport.join("r1", "b").await;
        transport.join("r2", "a").await;

        let mut members = transport.members("r1").await;
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        transport.leave("r1", "a").await;
        assert_eq!(transport.members("r1").await, vec!["b"]);

        transport.leave_all("b").await;
        assert!(transport.members("r1").await.is_empty());
        assert_eq!(transport.members("r2").await, vec!["a"]);
    }

    #[tokio::test]
    async fn emissions_reach_registered_members_only() {
        let transport = InMemoryTransport::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        transport.register("a", tx_a).await;
        transport.register("b", tx_b).await;
        transport.join("r1", "a").await;
        transport.join("r1", "b").await;

        transport
            .emit_to_room_except("r1", "a", "cursor-moved", json!({"row": 1}))
            .await;
        assert!(rx_a.try_recv().is_err());
        let raw = rx_b.try_recv().unwrap();
        assert!(raw.contains("cursor-moved"));

        transport
            .emit_to_socket("a", "timer-sync", json!({"seconds": 5}))
            .await;
        assert!(rx_a.try_recv().unwrap().contains("timer-sync"));
    }

    #[tokio::test]
    async fn unregister_drops_room_membership() {
        let transport = InMemoryTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        transport.register("a", tx).await;
        transport.join("r1", "a").await;
        transport.unregister("a").await;
        assert!(transport.members("r1").await.is_empty());
    }
}
