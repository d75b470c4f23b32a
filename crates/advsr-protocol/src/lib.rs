//! Wire protocol types for advsr real-time chat streaming.
//!
//! This crate defines the event envelope sent from the backend to every live
//! subscriber of a conversation:
//!
//! ```text
//! Browser tab(s) <--[WS: ChatEvent envelope]-- Backend --[SSE]--> Completion provider
//! ```
//!
//! Clients speak only this envelope. They do not know or care which
//! completion provider produced the text.
//!
//! ## Design principles
//!
//! 1. **Deltas are cumulative.** Every `content_delta` carries the full
//!    assistant text so far, so a subscriber that misses a frame is made
//!    whole by the next one.
//! 2. **Events form a fixed sequence per turn.** `conversation_snapshot`
//!    (once, at connect and at run start), zero or more `content_delta`,
//!    then exactly one `stream_end`.
//! 3. **System messages never appear on the wire.** Snapshots carry only
//!    user and assistant messages.

pub mod events;

pub use events::{ChatEvent, ConversationSnapshot, ConversationView, MessageView};
