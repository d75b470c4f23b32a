//! Chat service: conversation CRUD and the streaming turn orchestrator.
//!
//! A turn moves through admit (validate, check ownership), begin (claim
//! the run slot, persist the user message), run (broadcast a snapshot,
//! relay provider deltas through the batcher) and commit or fail. Both
//! final paths end the run and broadcast `stream_end`, so a conversation
//! can never stay `running` behind a finished stream.

use advsr_protocol::{ChatEvent, ConversationSnapshot};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::ChatError;
use super::lifecycle::{ConversationLifecycle, RunTicket};
use super::models::{Conversation, Message, MessageRole, summarize};
use super::provider::{
    CompletionProvider, CompletionResult, DeltaBatcher, PromptMessage, ProviderError, StreamEvent,
};
use super::repository::ChatRepository;
use crate::ws::ChatHub;

/// Directive conditioning every completion call. Persisted as the first
/// message of each conversation and prepended to every prompt.
pub const ADVISOR_DIRECTIVE: &str = "You will assume the role of a professional digital marketing advisor. You will only discuss marketing related questions. Please do not entertain non-marketing related questions.";

/// Conversation operations and the completion relay.
#[derive(Clone)]
pub struct ChatService {
    repo: ChatRepository,
    lifecycle: ConversationLifecycle,
    hub: ChatHub,
    provider: Arc<dyn CompletionProvider>,
    delta_batch_size: usize,
}

impl ChatService {
    pub fn new(
        repo: ChatRepository,
        lifecycle: ConversationLifecycle,
        hub: ChatHub,
        provider: Arc<dyn CompletionProvider>,
        delta_batch_size: usize,
    ) -> Self {
        Self {
            repo,
            lifecycle,
            hub,
            provider,
            delta_batch_size,
        }
    }

    /// Create a conversation from its first user message and start the
    /// first completion turn.
    ///
    /// The advisor directive is persisted as the conversation's first
    /// message row; the returned conversation is already `running`.
    #[instrument(skip(self, message))]
    pub async fn create_conversation(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<Conversation, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidMessage);
        }

        let conversation = self
            .repo
            .create_conversation(user_id, &summarize(message))
            .await?;
        self.repo
            .append_message(
                &conversation.id,
                user_id,
                MessageRole::System,
                ADVISOR_DIRECTIVE,
                None,
            )
            .await?;

        info!(
            conversation_id = %conversation.id,
            "Created conversation for user {}", user_id
        );

        // First turn goes through the same path as every later one
        self.submit_message(user_id, &conversation.id, message).await
    }

    /// Submit one user message and start a completion turn.
    ///
    /// Returns the conversation in `running` state as soon as the turn is
    /// admitted; streaming continues in a spawned relay task. While a turn
    /// is in flight further submissions are rejected with
    /// `ReplyInProgress` and their message is not persisted.
    #[instrument(skip(self, message))]
    pub async fn submit_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: &str,
    ) -> Result<Conversation, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidMessage);
        }
        self.load_owned(user_id, conversation_id).await?;

        let ticket = self.lifecycle.try_begin_run(conversation_id).await?;

        let (conversation, snapshot, prompt) =
            match self.prepare_turn(user_id, conversation_id, message).await {
                Ok(prepared) => prepared,
                Err(err) => {
                    // Nothing streamed yet; just release the slot
                    self.lifecycle.end_run(ticket).await;
                    return Err(err);
                }
            };

        self.hub.broadcast(
            conversation_id,
            &ChatEvent::ConversationSnapshot { data: snapshot },
        );

        let owner_id = conversation.user_id.clone();
        tokio::spawn(self.clone().run_completion(ticket, owner_id, prompt));

        Ok(conversation)
    }

    /// Persist the user message and assemble everything the relay needs.
    async fn prepare_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: &str,
    ) -> Result<(Conversation, ConversationSnapshot, Vec<PromptMessage>), ChatError> {
        self.repo
            .append_message(conversation_id, user_id, MessageRole::User, message, None)
            .await?;

        let conversation = self
            .repo
            .get_conversation(conversation_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let history = self.repo.list_visible_messages(conversation_id).await?;

        let snapshot = ConversationSnapshot {
            conversation: conversation.view(),
            messages: history.iter().map(Message::view).collect(),
        };
        let prompt = build_prompt(&history);

        Ok((conversation, snapshot, prompt))
    }

    /// Relay one completion stream to the hub, then settle the turn.
    ///
    /// Every exit path ends the run and broadcasts `stream_end`. Provider
    /// and persistence failures are logged and contained here; they never
    /// leave the conversation `running`.
    async fn run_completion(self, ticket: RunTicket, owner_id: String, prompt: Vec<PromptMessage>) {
        let conversation_id = ticket.conversation_id().to_string();
        let mut batcher = DeltaBatcher::new(self.delta_batch_size);

        let outcome = self
            .relay_stream(&conversation_id, &mut batcher, prompt)
            .await;

        // Late or final tail, and on a turn that emitted nothing the empty
        // cumulative text, so subscribers always see at least one delta
        if let Some(cumulative) = batcher.flush() {
            self.hub
                .broadcast(&conversation_id, &ChatEvent::ContentDelta { data: cumulative });
        }

        match outcome {
            Ok(result) => {
                let metadata = result.metadata_json();
                if let Err(err) = self
                    .repo
                    .append_message(
                        &conversation_id,
                        &owner_id,
                        MessageRole::Assistant,
                        &result.text,
                        Some(&metadata),
                    )
                    .await
                {
                    // Conversation deleted mid-run, or storage failure
                    warn!(
                        "Failed to persist assistant message for conversation {}: {:#}",
                        conversation_id, err
                    );
                }
            }
            Err(err) => {
                warn!("Completion failed for conversation {}: {}", conversation_id, err);
            }
        }

        self.lifecycle.end_run(ticket).await;
        self.hub.broadcast(&conversation_id, &ChatEvent::StreamEnd);
    }

    /// Drive the provider stream, pushing batched cumulative deltas to the
    /// hub as they become due.
    async fn relay_stream(
        &self,
        conversation_id: &str,
        batcher: &mut DeltaBatcher,
        prompt: Vec<PromptMessage>,
    ) -> Result<CompletionResult, ProviderError> {
        let mut stream = self.provider.stream_completion(prompt).await?;

        loop {
            match stream.recv().await {
                Some(StreamEvent::Delta(delta)) => {
                    if let Some(cumulative) = batcher.push(&delta) {
                        self.hub.broadcast(
                            conversation_id,
                            &ChatEvent::ContentDelta { data: cumulative },
                        );
                    }
                }
                Some(StreamEvent::Completed(result)) => return Ok(result),
                Some(StreamEvent::Failed(err)) => return Err(err),
                None => {
                    return Err(ProviderError::Transport(
                        "stream closed without a terminal event".to_string(),
                    ));
                }
            }
        }
    }

    /// List the user's conversations, newest first.
    #[instrument(skip(self))]
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.repo.list_conversations(user_id).await?)
    }

    /// Get one conversation owned by the user.
    #[instrument(skip(self))]
    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        self.load_owned(user_id, conversation_id).await
    }

    /// List a conversation's messages, system rows excluded.
    #[instrument(skip(self))]
    pub async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        self.load_owned(user_id, conversation_id).await?;
        Ok(self.repo.list_visible_messages(conversation_id).await?)
    }

    /// Full current state of a conversation: the document plus its visible
    /// messages. Used by the WebSocket handshake.
    #[instrument(skip(self))]
    pub async fn snapshot(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationSnapshot, ChatError> {
        let conversation = self.load_owned(user_id, conversation_id).await?;
        let messages = self.repo.list_visible_messages(conversation_id).await?;

        Ok(ConversationSnapshot {
            conversation: conversation.view(),
            messages: messages.iter().map(Message::view).collect(),
        })
    }

    /// Delete a conversation and force-close its subscribers.
    ///
    /// An in-flight run survives the deletion: its final persist fails
    /// against the missing row and its end-of-run transition is a no-op.
    #[instrument(skip(self))]
    pub async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatError> {
        self.load_owned(user_id, conversation_id).await?;

        if !self.repo.delete_conversation(conversation_id).await? {
            return Err(ChatError::NotFound);
        }
        self.hub.close_conversation(conversation_id);

        info!("Deleted conversation {} for user {}", conversation_id, user_id);
        Ok(())
    }

    /// Whether a completion turn is currently in flight.
    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.lifecycle.is_running(conversation_id)
    }

    async fn load_owned(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .repo
            .get_conversation(conversation_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        if conversation.user_id != user_id {
            return Err(ChatError::NotOwner);
        }

        Ok(conversation)
    }
}

/// Assemble the provider prompt: the advisor directive followed by the
/// non-system history in insertion order.
fn build_prompt(history: &[Message]) -> Vec<PromptMessage> {
    let mut prompt = Vec::with_capacity(history.len() + 1);
    prompt.push(PromptMessage::new(MessageRole::System, ADVISOR_DIRECTIVE));
    for message in history {
        prompt.push(PromptMessage::new(message.role, message.content.clone()));
    }
    prompt
}
