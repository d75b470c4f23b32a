//! Advisor conversations module.
//!
//! Persistence (`repository`), run state (`lifecycle`), the streaming
//! completion backend (`provider`) and the turn orchestrator (`service`).

mod lifecycle;
mod models;
mod provider;
mod repository;
mod service;
pub mod testing;

pub use lifecycle::{ConversationLifecycle, RunTicket};
pub use models::{Conversation, ConversationStatus, Message, MessageRole};
pub use provider::{
    CompletionProvider, CompletionResult, CompletionStream, DEFAULT_BASE_URL,
    DEFAULT_DELTA_BATCH_SIZE, DEFAULT_MODEL, DeltaBatcher, OpenAiProvider, PromptMessage,
    ProviderError, StreamEvent,
};
pub use repository::ChatRepository;
pub use service::{ADVISOR_DIRECTIVE, ChatService};

/// Expected failures of conversation operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message must not be empty")]
    InvalidMessage,

    #[error("conversation not found")]
    NotFound,

    #[error("conversation belongs to another user")]
    NotOwner,

    #[error("a reply is already being generated for this conversation")]
    ReplyInProgress,

    #[error("completion provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}
