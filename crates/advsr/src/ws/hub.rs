//! Subscriber registry and event fan-out.
//!
//! Maps conversation ids to live WebSocket subscribers. Delivery is
//! best-effort: a subscriber that cannot keep up or has gone away is
//! pruned on the spot and simply misses in-flight events; the final
//! state is always recoverable from the persisted conversation.

use advsr_protocol::ChatEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound event buffer per subscriber connection.
pub const SUBSCRIBER_BUFFER: usize = 64;

/// One registered subscriber connection.
#[derive(Debug)]
struct Subscriber {
    connection_id: String,
    user_id: String,
    sender: mpsc::Sender<String>,
}

/// Registry of live subscribers, keyed by conversation id.
///
/// Ownership checks happen in the WebSocket handler before `register` is
/// called; the hub itself only routes.
#[derive(Debug, Clone, Default)]
pub struct ChatHub {
    subscribers: Arc<DashMap<String, Vec<Subscriber>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a conversation. Returns the connection id
    /// used to unregister it later.
    pub fn register(
        &self,
        conversation_id: &str,
        user_id: &str,
        sender: mpsc::Sender<String>,
    ) -> String {
        let connection_id = Uuid::new_v4().to_string();

        self.subscribers
            .entry(conversation_id.to_string())
            .or_default()
            .push(Subscriber {
                connection_id: connection_id.clone(),
                user_id: user_id.to_string(),
                sender,
            });

        debug!(
            "Subscriber {} registered for conversation {}",
            connection_id, conversation_id
        );
        connection_id
    }

    /// Remove a subscriber. Unknown ids are a no-op, so disconnect paths
    /// may call this unconditionally and more than once.
    pub fn unregister(&self, conversation_id: &str, connection_id: &str) {
        if let Some(mut subscribers) = self.subscribers.get_mut(conversation_id) {
            subscribers.retain(|s| s.connection_id != connection_id);
        }
        // Conversations with no subscribers are not tracked at all
        self.subscribers
            .remove_if(conversation_id, |_, subscribers| subscribers.is_empty());
    }

    /// Fan an event out to every subscriber of a conversation.
    ///
    /// The event is serialized once. A send that fails, because the buffer
    /// is full or the receiver is gone, prunes that subscriber immediately
    /// and never blocks the others.
    pub fn broadcast(&self, conversation_id: &str, event: &ChatEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(err) => {
                warn!("Failed to serialize chat event: {}", err);
                return;
            }
        };

        if let Some(mut subscribers) = self.subscribers.get_mut(conversation_id) {
            subscribers.retain(|subscriber| match subscriber.sender.try_send(text.clone()) {
                Ok(()) => true,
                Err(err) => {
                    debug!(
                        "Dropping subscriber {} of conversation {}: {}",
                        subscriber.connection_id, conversation_id, err
                    );
                    false
                }
            });
        }
        self.subscribers
            .remove_if(conversation_id, |_, subscribers| subscribers.is_empty());
    }

    /// Drop every subscriber of a conversation. Each connection's pump
    /// observes its channel closing and shuts the socket down.
    pub fn close_conversation(&self, conversation_id: &str) {
        if let Some((_, subscribers)) = self.subscribers.remove(conversation_id) {
            debug!(
                "Closed conversation {} with {} subscriber(s)",
                conversation_id,
                subscribers.len()
            );
        }
    }

    /// Number of live subscribers for a conversation.
    pub fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.subscribers
            .get(conversation_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Number of conversations currently holding at least one subscriber.
    pub fn tracked_conversations(&self) -> usize {
        self.subscribers.len()
    }

    /// User id a connection was registered with, if still present.
    pub fn subscriber_user(&self, conversation_id: &str, connection_id: &str) -> Option<String> {
        self.subscribers.get(conversation_id).and_then(|subscribers| {
            subscribers
                .iter()
                .find(|s| s.connection_id == connection_id)
                .map(|s| s.user_id.clone())
        })
    }
}
