//! Application state shared across handlers.

use crate::auth::AuthState;
use crate::chat::ChatService;
use crate::user::UserService;
use crate::ws::ChatHub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation operations and streaming turns.
    pub chat: ChatService,
    /// User registration and credential checks.
    pub users: UserService,
    /// Authentication state.
    pub auth: AuthState,
    /// Subscriber registry for conversation events.
    pub hub: ChatHub,
}

impl AppState {
    /// Create new application state.
    pub fn new(chat: ChatService, users: UserService, auth: AuthState, hub: ChatHub) -> Self {
        Self {
            chat,
            users,
            auth,
            hub,
        }
    }
}
