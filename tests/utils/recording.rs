use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

use parlor::Transport;

/// Where an emission was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Room(String),
    Socket(String),
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub target: Target,
    pub event: String,
    pub payload: Value,
}

/// Transport double that records every emission while tracking room
/// membership like the real thing.
#[derive(Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<RecordedEvent>>,
    rooms: Mutex<HashMap<String, HashSet<String>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// All payloads broadcast under an event name, in emission order.
    pub fn payloads_named(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.payload.clone())
            .collect()
    }

    pub fn count_named(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    pub fn last_named(&self, event: &str) -> Option<Value> {
        self.payloads_named(event).pop()
    }

    /// Payloads sent directly to one socket under an event name.
    pub fn socket_payloads(&self, socket_id: &str, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == event && e.target == Target::Socket(socket_id.to_string()))
            .map(|e| e.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, target: Target, event: &str, payload: Value) {
        self.events.lock().unwrap().push(RecordedEvent {
            target,
            event: event.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn register(&self, _socket_id: &str, _sender: mpsc::UnboundedSender<String>) {}

    async fn unregister(&self, socket_id: &str) {
        self.leave_all(socket_id).await;
    }

    async fn join(&self, room: &str, socket_id: &str) {
        self.rooms
            .lock()
            .unwrap()
            .entry(room.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    async fn leave(&self, room: &str, socket_id: &str) {
        if let Some(members) = self.rooms.lock().unwrap().get_mut(room) {
            members.remove(socket_id);
        }
    }

    async fn leave_all(&self, socket_id: &str) {
        for members in self.rooms.lock().unwrap().values_mut() {
            members.remove(socket_id);
        }
    }

    async fn members(&self, room: &str) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap()
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn emit_to_room(&self, room: &str, event: &str, payload: Value) {
        self.record(Target::Room(room.to_string()), event, payload);
    }

    async fn emit_to_room_except(&self, room: &str, _skip: &str, event: &str, payload: Value) {
        self.record(Target::Room(room.to_string()), event, payload);
    }

    async fn emit_to_socket(&self, socket_id: &str, event: &str, payload: Value) {
        self.record(Target::Socket(socket_id.to_string()), event, payload);
    }
}
