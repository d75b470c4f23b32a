//! Real-time subscription transport.
//!
//! Subscribers open one WebSocket per conversation and receive a
//! server-originated event stream; they never drive the conversation over
//! the socket.
//!
//! ```text
//! ChatService ──broadcast──▶ ChatHub ──per-subscriber channel──▶ ws_handler ──▶ socket
//! ```

mod hub;
mod handler;

pub use handler::ws_handler;
pub use hub::{ChatHub, SUBSCRIBER_BUFFER};
