//! Server-to-subscriber event envelope.

use serde::{Deserialize, Serialize};

/// A conversation as exposed on the wire.
///
/// `status` is `"idle"` or `"running"`; timestamps are RFC3339 UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub summary: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A message as exposed on the wire. System messages are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Full conversation state: the document plus its visible messages in
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation: ConversationView,
    pub messages: Vec<MessageView>,
}

/// Events sent from backend to subscribers over WebSocket.
///
/// Serialized as a tagged union on `type`, e.g.
/// `{"type":"content_delta","data":"Hello wo"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Full current conversation state. Sent once when a subscriber
    /// connects and once when a completion run begins.
    ConversationSnapshot { data: ConversationSnapshot },

    /// Cumulative assistant text for the in-flight turn. Not a diff: each
    /// event replaces the previous one entirely.
    ContentDelta { data: String },

    /// Marks the end of one assistant turn. Carries no payload; whether the
    /// turn produced a new assistant message is visible in the next
    /// snapshot or message listing.
    StreamEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> ConversationSnapshot {
        ConversationSnapshot {
            conversation: ConversationView {
                id: "c1".to_string(),
                user_id: "u1".to_string(),
                status: "running".to_string(),
                summary: "What is SEO?".to_string(),
                created_at: "2024-05-01T12:00:00Z".to_string(),
                updated_at: "2024-05-01T12:00:01Z".to_string(),
            },
            messages: vec![MessageView {
                id: "m1".to_string(),
                role: "user".to_string(),
                content: "What is SEO?".to_string(),
                created_at: "2024-05-01T12:00:00Z".to_string(),
            }],
        }
    }

    #[test]
    fn snapshot_event_serialization() {
        let event = ChatEvent::ConversationSnapshot {
            data: sample_snapshot(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"conversation_snapshot\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"summary\":\"What is SEO?\""));
    }

    #[test]
    fn content_delta_serialization() {
        let event = ChatEvent::ContentDelta {
            data: "Search engine".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"content_delta","data":"Search engine"}"#);
    }

    #[test]
    fn stream_end_serialization() {
        let json = serde_json::to_string(&ChatEvent::StreamEnd).unwrap();
        assert_eq!(json, r#"{"type":"stream_end"}"#);
    }

    #[test]
    fn events_round_trip() {
        let original = ChatEvent::ConversationSnapshot {
            data: sample_snapshot(),
        };
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ChatEvent = serde_json::from_str(&json).unwrap();
        match decoded {
            ChatEvent::ConversationSnapshot { data } => {
                assert_eq!(data, sample_snapshot());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
