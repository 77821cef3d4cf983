//! Durable checkpointing of conversation state.
//!
//! One live checkpoint per conversation id, replaced atomically on save.
//! Revisions implement optimistic concurrency: a save must carry exactly
//! `stored revision + 1` or it is rejected with [`CheckpointError::Conflict`].

pub mod persistence;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::approval::PendingApproval;
use crate::message::Message;

/// Snapshot of everything needed to resume a conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub conversation_id: String,
    /// Monotonic per-conversation revision, starting at 1 for the first save.
    pub revision: u64,
    pub messages: Vec<Message>,
    pub pending_approval: Option<PendingApproval>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    pub fn new(
        conversation_id: String,
        revision: u64,
        messages: Vec<Message>,
        pending_approval: Option<PendingApproval>,
    ) -> Self {
        Self {
            conversation_id,
            revision,
            messages,
            pending_approval,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    /// The save lost an optimistic-concurrency race.
    #[error(
        "stale checkpoint for conversation {conversation_id}: tried revision {attempted}, store has {stored}"
    )]
    #[diagnostic(
        code(threadloom::checkpoint::conflict),
        help("another run saved first; reload the conversation and retry")
    )]
    Conflict {
        conversation_id: String,
        attempted: u64,
        stored: u64,
    },

    #[error("checkpoint serialization failed: {0}")]
    #[diagnostic(code(threadloom::checkpoint::serde))]
    Serde(#[from] serde_json::Error),

    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(threadloom::checkpoint::backend))]
    Backend { message: String },
}

/// Durable latest-checkpoint store. Implementations must be linearizable per
/// conversation id; `save` is atomic.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for the conversation, or `None` when the
    /// conversation has never been saved. Callers treat `None` as an empty
    /// conversation.
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replaces the live checkpoint. `checkpoint.revision` must equal the
    /// stored revision plus one (or 1 for a first save).
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;
}

/// Process-local store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    inner: Mutex<FxHashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let inner = self.inner.lock().expect("checkpoint map poisoned");
        Ok(inner.get(conversation_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let mut inner = self.inner.lock().expect("checkpoint map poisoned");
        let stored = inner
            .get(&checkpoint.conversation_id)
            .map(|c| c.revision)
            .unwrap_or(0);
        if checkpoint.revision != stored + 1 {
            return Err(CheckpointError::Conflict {
                conversation_id: checkpoint.conversation_id,
                attempted: checkpoint.revision,
                stored,
            });
        }
        inner.insert(checkpoint.conversation_id.clone(), checkpoint);
        Ok(())
    }
}

/// Which checkpoint backend to construct.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckpointBackend {
    #[default]
    InMemory,
    /// SQLite via sqlx. `None` resolves the database URL from the
    /// environment: `THREADLOOM_SQLITE_URL`, falling back to
    /// `SQLITE_DB_NAME`, falling back to `threadloom.db`.
    #[cfg(feature = "sqlite")]
    Sqlite(Option<String>),
}

impl CheckpointBackend {
    /// Builds the store. For sqlite this creates the database file if absent
    /// and runs embedded migrations when the `sqlite-migrations` feature is
    /// on.
    pub async fn connect(&self) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
        match self {
            CheckpointBackend::InMemory => Ok(Arc::new(InMemoryCheckpointStore::new())),
            #[cfg(feature = "sqlite")]
            CheckpointBackend::Sqlite(url) => {
                let url = match url {
                    Some(url) => url.clone(),
                    None => sqlite::resolve_database_url(),
                };
                let store = sqlite::SqliteCheckpointStore::connect(&url).await?;
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(id: &str, revision: u64) -> Checkpoint {
        Checkpoint::new(id.to_string(), revision, vec![Message::human("hi")], None)
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        store.save(checkpoint("c1", 1)).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn save_rejects_stale_revision() {
        let store = InMemoryCheckpointStore::new();
        store.save(checkpoint("c1", 1)).await.unwrap();
        store.save(checkpoint("c1", 2)).await.unwrap();

        let err = store.save(checkpoint("c1", 2)).await.unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Conflict {
                attempted: 2,
                stored: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn first_save_must_be_revision_one() {
        let store = InMemoryCheckpointStore::new();
        let err = store.save(checkpoint("c1", 5)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { stored: 0, .. }));
    }
}
