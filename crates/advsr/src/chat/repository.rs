//! Chat repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::models::{Conversation, Message, MessageRole};
use crate::db;

/// Repository for conversation and message database operations.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new chat repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new conversation in `idle` state.
    #[instrument(skip(self, summary))]
    pub async fn create_conversation(&self, user_id: &str, summary: &str) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = db::timestamp();

        debug!("Creating conversation {} for user {}", id, user_id);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, status, summary, created_at, updated_at)
            VALUES (?, ?, 'idle', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(summary)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("Failed to insert conversation")?;

        self.get_conversation(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Conversation not found after creation"))
    }

    /// Get a conversation by ID.
    #[instrument(skip(self))]
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, status, summary, created_at, updated_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch conversation")?;

        Ok(conversation)
    }

    /// List a user's conversations, newest first.
    #[instrument(skip(self))]
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, status, summary, created_at, updated_at
            FROM conversations
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conversations")?;

        Ok(conversations)
    }

    /// Transition `idle -> running`, but only if the row is currently idle.
    ///
    /// Returns `false` when zero rows changed, either because the
    /// conversation is already running or because it no longer exists.
    #[instrument(skip(self))]
    pub async fn mark_running_if_idle(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'running', updated_at = ?
            WHERE id = ? AND status = 'idle'
            "#,
        )
        .bind(db::timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark conversation running")?;

        Ok(result.rows_affected() == 1)
    }

    /// Transition `running -> idle`. Already-idle and deleted rows are left
    /// untouched; returns whether a row actually changed.
    #[instrument(skip(self))]
    pub async fn mark_idle(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'idle', updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(db::timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark conversation idle")?;

        Ok(result.rows_affected() == 1)
    }

    /// Sweep every `running` conversation back to `idle`.
    ///
    /// Run at startup before the server accepts traffic; rows left `running`
    /// by a crashed process have no live task behind them.
    #[instrument(skip(self))]
    pub async fn reset_all_running(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'idle', updated_at = ?
            WHERE status = 'running'
            "#,
        )
        .bind(db::timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to reset running conversations")?;

        Ok(result.rows_affected())
    }

    /// Delete a conversation. Messages cascade. Returns whether a row was
    /// deleted.
    #[instrument(skip(self))]
    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete conversation")?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a message and bump the conversation's `updated_at`.
    ///
    /// Fails when the conversation row is gone (foreign key), which is how
    /// a relay task discovers its conversation was deleted mid-run.
    #[instrument(skip(self, content, result))]
    pub async fn append_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
        result: Option<&str>,
    ) -> Result<Message> {
        let id = Uuid::new_v4().to_string();
        let now = db::timestamp();

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, user_id, role, content, result, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(user_id)
        .bind(role.to_string())
        .bind(content)
        .bind(result)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("Failed to touch conversation")?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, user_id, role, content, result, created_at, updated_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await
        .context("Message not found after insert")?;

        Ok(message)
    }

    /// All messages of a conversation in insertion order, system rows
    /// included.
    ///
    /// `rowid` breaks ties between rows written in the same microsecond,
    /// so the order stays the insertion order.
    #[instrument(skip(self))]
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, user_id, role, content, result, created_at, updated_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list messages")?;

        Ok(messages)
    }

    /// Messages of a conversation in insertion order, system rows excluded.
    #[instrument(skip(self))]
    pub async fn list_visible_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, user_id, role, content, result, created_at, updated_at
            FROM messages
            WHERE conversation_id = ? AND role != 'system'
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list visible messages")?;

        Ok(messages)
    }
}
