use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound client message envelope: `{"event": "...", "payload": {...}}`.
/// Anything that fails to parse is treated as late or adversarial and
/// dropped without a reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// String field from the payload, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key)?.as_str()
    }

    /// Integer field, coercing JSON numbers (floats truncate) and numeric
    /// strings the way a loose client would send them.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        let value = self.payload.get(key)?;
        if let Some(n) = value.as_i64() {
            return Some(n);
        }
        if let Some(f) = value.as_f64() {
            return Some(f as i64);
        }
        value.as_str()?.trim().parse().ok()
    }

    /// Display names are trimmed and clamped to 20 code points.
    pub fn name_field(&self, key: &str) -> Option<String> {
        let raw = self.str_field(key)?.trim();
        if raw.is_empty() {
            return None;
        }
        Some(raw.chars().take(20).collect())
    }
}

/// Outbound envelope, mirrored by every client listener.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage<'a> {
    pub event: &'a str,
    pub payload: Value,
}

impl<'a> ServerMessage<'a> {
    pub fn encode(event: &'a str, payload: Value) -> String {
        serde_json::to_string(&ServerMessage { event, payload })
            .unwrap_or_else(|_| format!("{{\"event\":\"{}\",\"payload\":null}}", event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_envelope_and_fields() {
        let msg = ClientMessage::parse(
            r#"{"event":"cell-update","payload":{"row":3,"col":"7","letter":"Q"}}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "cell-update");
        assert_eq!(msg.int_field("row"), Some(3));
        assert_eq!(msg.int_field("col"), Some(7));
        assert_eq!(msg.str_field("letter"), Some("Q"));
        assert_eq!(msg.int_field("missing"), None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(ClientMessage::parse("not json").is_none());
        assert!(ClientMessage::parse(r#"{"payload":{}}"#).is_none());
    }

    #[test]
    fn names_are_trimmed_and_clamped() {
        let msg = ClientMessage::parse(&format!(
            r#"{{"event":"join-room","payload":{{"playerName":"  {}  "}}}}"#,
            "x".repeat(40)
        ))
        .unwrap();
        assert_eq!(msg.name_field("playerName").unwrap().chars().count(), 20);

        let blank = ClientMessage::parse(r#"{"event":"e","payload":{"playerName":"   "}}"#).unwrap();
        assert_eq!(blank.name_field("playerName"), None);
    }

    #[test]
    fn encode_produces_envelope() {
        let raw = ServerMessage::encode("timer-sync", json!({"seconds": 12}));
        let back: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(back["event"], "timer-sync");
        assert_eq!(back["payload"]["seconds"], 12);
    }
}
