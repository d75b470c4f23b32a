//! WebSocket endpoint for conversation subscriptions.

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use advsr_protocol::ChatEvent;

use crate::api::{ApiError, AppState};
use crate::auth::CurrentUser;

use super::hub::SUBSCRIBER_BUFFER;

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Query parameters for the subscription endpoint.
#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Conversation to subscribe to.
    pub id: String,
}

/// WebSocket upgrade handler.
///
/// GET /chat?id=<conversation_id>
///
/// Authentication and ownership are checked before the upgrade, so a
/// client that fails either never receives a single event.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = user.id().to_string();

    state.chat.get_conversation(&user_id, &query.id).await?;

    info!(
        "WebSocket subscription from user {} to conversation {}",
        user_id, query.id
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, query.id, user_id)))
}

/// Pump hub events for one conversation onto one socket.
///
/// The first frame is always a fresh `conversation_snapshot`. Events that
/// arrive while it is being fetched queue behind it; deltas are cumulative
/// so the client converges regardless.
async fn handle_socket(
    mut socket: WebSocket,
    state: AppState,
    conversation_id: String,
    user_id: String,
) {
    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_BUFFER);
    let connection_id = state.hub.register(&conversation_id, &user_id, tx);

    let snapshot = match state.chat.snapshot(&user_id, &conversation_id).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            // Conversation deleted between upgrade and registration
            warn!(
                "Dropping subscription to conversation {}: {}",
                conversation_id, err
            );
            state.hub.unregister(&conversation_id, &connection_id);
            return;
        }
    };

    let first = ChatEvent::ConversationSnapshot { data: snapshot };
    let sent = match serde_json::to_string(&first) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            warn!("Failed to serialize snapshot: {}", err);
            false
        }
    };
    if !sent {
        state.hub.unregister(&conversation_id, &connection_id);
        return;
    }

    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed, client disconnected");
                            break;
                        }
                    }
                    None => {
                        // Conversation closed or this subscriber was pruned
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("Received pong from user {}", user_id);
                    }
                    Some(Ok(Message::Text(_))) => {
                        // Subscriptions are one-way; messages are submitted
                        // over HTTP
                        debug!("Ignoring text frame on subscription socket");
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame on subscription socket");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("User {} closed WebSocket connection", user_id);
                        break;
                    }
                    Some(Err(err)) => {
                        warn!("WebSocket error for user {}: {}", user_id, err);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended for user {}", user_id);
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unregister(&conversation_id, &connection_id);
    info!(
        "WebSocket subscription closed for conversation {}",
        conversation_id
    );
}
