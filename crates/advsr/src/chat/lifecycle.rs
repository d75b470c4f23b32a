//! Conversation run lifecycle.
//!
//! Guards the single-flight invariant: at most one completion turn may be
//! in flight per conversation. A turn claims an in-memory slot first, then
//! compare-and-sets the persisted row `idle -> running`. Both must succeed
//! before a relay task starts.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::ChatError;
use super::repository::ChatRepository;

/// Proof that a run slot is held. Consumed by [`ConversationLifecycle::end_run`],
/// so a run cannot be ended twice.
#[must_use = "a run that is never ended leaves its conversation stuck running"]
#[derive(Debug)]
pub struct RunTicket {
    conversation_id: String,
    started: Instant,
}

impl RunTicket {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

/// Tracks which conversations currently have a completion turn in flight.
#[derive(Debug, Clone)]
pub struct ConversationLifecycle {
    repo: ChatRepository,
    active: Arc<DashMap<String, Instant>>,
}

impl ConversationLifecycle {
    pub fn new(repo: ChatRepository) -> Self {
        Self {
            repo,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Claim the run slot for a conversation.
    ///
    /// Fails with `ReplyInProgress` when another turn holds the slot or the
    /// persisted row is already `running`, and `NotFound` when the
    /// conversation does not exist. On failure no state is left behind.
    #[instrument(skip(self))]
    pub async fn try_begin_run(&self, conversation_id: &str) -> Result<RunTicket, ChatError> {
        let started = Instant::now();

        // The entry guard must be released before any await point.
        match self.active.entry(conversation_id.to_string()) {
            Entry::Occupied(_) => return Err(ChatError::ReplyInProgress),
            Entry::Vacant(entry) => {
                entry.insert(started);
            }
        }

        match self.repo.mark_running_if_idle(conversation_id).await {
            Ok(true) => {
                debug!("Run started for conversation {}", conversation_id);
                Ok(RunTicket {
                    conversation_id: conversation_id.to_string(),
                    started,
                })
            }
            Ok(false) => {
                self.active.remove(conversation_id);
                // Zero rows changed: the row is gone, or it was not idle.
                match self.repo.get_conversation(conversation_id).await {
                    Ok(Some(_)) => Err(ChatError::ReplyInProgress),
                    Ok(None) => Err(ChatError::NotFound),
                    Err(err) => Err(ChatError::Persistence(err)),
                }
            }
            Err(err) => {
                self.active.remove(conversation_id);
                Err(ChatError::Persistence(err))
            }
        }
    }

    /// Release a run slot and transition the persisted row back to `idle`.
    ///
    /// The in-memory slot is released even when the persisted write fails
    /// or the row is gone; a conversation deleted mid-run has nothing left
    /// to transition.
    #[instrument(skip(self, ticket), fields(conversation_id = %ticket.conversation_id))]
    pub async fn end_run(&self, ticket: RunTicket) {
        let RunTicket {
            conversation_id,
            started,
        } = ticket;

        match self.repo.mark_idle(&conversation_id).await {
            Ok(changed) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    row_updated = changed,
                    "Run ended for conversation {}",
                    conversation_id
                );
            }
            Err(err) => {
                warn!(
                    "Failed to mark conversation {} idle after run: {:#}",
                    conversation_id, err
                );
            }
        }

        self.active.remove(&conversation_id);
    }

    /// Sweep rows left `running` by a previous process back to `idle`.
    ///
    /// Must run before the server accepts traffic; a fresh process has no
    /// in-flight turns, so every `running` row is stale.
    pub async fn reconcile_on_startup(&self) -> anyhow::Result<u64> {
        let swept = self.repo.reset_all_running().await?;
        if swept > 0 {
            warn!("Reset {} conversation(s) left running by a previous run", swept);
        }
        Ok(swept)
    }

    /// Whether a turn is currently in flight for this conversation.
    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.active.contains_key(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::ConversationStatus;
    use crate::db::Database;
    use crate::user::UserRepository;

    async fn lifecycle_with_conversation() -> (ConversationLifecycle, ChatRepository, String) {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool().clone());
        let user = users
            .create("owner@example.com", "hash", None)
            .await
            .unwrap();
        let repo = ChatRepository::new(db.pool().clone());
        let conversation = repo.create_conversation(&user.id, "hi").await.unwrap();
        (ConversationLifecycle::new(repo.clone()), repo, conversation.id)
    }

    #[tokio::test]
    async fn test_begin_end_round_trip() {
        let (lifecycle, repo, id) = lifecycle_with_conversation().await;

        let ticket = lifecycle.try_begin_run(&id).await.unwrap();
        assert!(lifecycle.is_running(&id));
        assert_eq!(
            repo.get_conversation(&id).await.unwrap().unwrap().status,
            ConversationStatus::Running
        );

        lifecycle.end_run(ticket).await;
        assert!(!lifecycle.is_running(&id));
        assert_eq!(
            repo.get_conversation(&id).await.unwrap().unwrap().status,
            ConversationStatus::Idle
        );

        // The slot is reusable after a completed run
        let ticket = lifecycle.try_begin_run(&id).await.unwrap();
        lifecycle.end_run(ticket).await;
    }

    #[tokio::test]
    async fn test_second_begin_conflicts() {
        let (lifecycle, _repo, id) = lifecycle_with_conversation().await;

        let ticket = lifecycle.try_begin_run(&id).await.unwrap();
        assert!(matches!(
            lifecycle.try_begin_run(&id).await,
            Err(ChatError::ReplyInProgress)
        ));

        lifecycle.end_run(ticket).await;
    }

    #[tokio::test]
    async fn test_begin_missing_conversation() {
        let (lifecycle, _repo, _id) = lifecycle_with_conversation().await;

        assert!(matches!(
            lifecycle.try_begin_run("missing").await,
            Err(ChatError::NotFound)
        ));
        assert!(!lifecycle.is_running("missing"));
    }

    #[tokio::test]
    async fn test_running_row_without_slot_reports_conflict() {
        let (lifecycle, repo, id) = lifecycle_with_conversation().await;

        // Row forced to running without an in-memory slot
        repo.mark_running_if_idle(&id).await.unwrap();
        assert!(matches!(
            lifecycle.try_begin_run(&id).await,
            Err(ChatError::ReplyInProgress)
        ));
        // The failed attempt left no slot behind
        assert!(!lifecycle.is_running(&id));
    }

    #[tokio::test]
    async fn test_end_run_after_delete_releases_slot() {
        let (lifecycle, repo, id) = lifecycle_with_conversation().await;

        let ticket = lifecycle.try_begin_run(&id).await.unwrap();
        repo.delete_conversation(&id).await.unwrap();

        lifecycle.end_run(ticket).await;
        assert!(!lifecycle.is_running(&id));
    }

    #[tokio::test]
    async fn test_reconcile_sweeps_stale_rows() {
        let (lifecycle, repo, id) = lifecycle_with_conversation().await;

        repo.mark_running_if_idle(&id).await.unwrap();
        assert_eq!(lifecycle.reconcile_on_startup().await.unwrap(), 1);
        assert_eq!(
            repo.get_conversation(&id).await.unwrap().unwrap().status,
            ConversationStatus::Idle
        );
        assert_eq!(lifecycle.reconcile_on_startup().await.unwrap(), 0);
    }
}
