//! Chat data models.

use advsr_protocol::{ConversationView, MessageView};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a conversation.
///
/// `Running` while a completion turn is in flight, `Idle` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Running,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Idle => write!(f, "idle"),
            ConversationStatus::Running => write!(f, "running"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ConversationStatus::Idle),
            "running" => Ok(ConversationStatus::Running),
            _ => Err(format!("Invalid conversation status: {}", s)),
        }
    }
}

impl TryFrom<String> for ConversationStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Invalid message role: {}", s)),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Conversation entity from database.
#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub status: ConversationStatus,
    pub summary: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// Wire representation for API responses and snapshots.
    pub fn view(&self) -> ConversationView {
        ConversationView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            status: self.status.to_string(),
            summary: self.summary.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Message entity from database.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    pub content: String,
    /// Completion metadata JSON for assistant messages, NULL otherwise.
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Message {
    /// Wire representation. The `result` column stays server-side.
    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id.clone(),
            role: self.role.to_string(),
            content: self.content.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Cap for summaries derived from the first user message.
const SUMMARY_MAX_CHARS: usize = 100;

/// Derive a conversation summary from its first user message.
pub fn summarize(message: &str) -> String {
    message.chars().take(SUMMARY_MAX_CHARS).collect()
}
