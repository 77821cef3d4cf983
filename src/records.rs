//! Conversation metadata records.
//!
//! The core does not own conversation CRUD; it only guarantees a record
//! exists before a run writes checkpoints. Callers plug in their own backing
//! store through this trait.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RecordsError {
    #[error("conversation records backend error: {message}")]
    #[diagnostic(code(threadloom::records::backend))]
    Backend { message: String },
}

/// Ensures conversation metadata exists. Idempotent: repeated calls for the
/// same id are no-ops, and the title hint only applies on first creation.
#[async_trait]
pub trait ConversationRecords: Send + Sync {
    async fn ensure(&self, conversation_id: &str, title_hint: &str) -> Result<(), RecordsError>;
}

/// Process-local records for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryConversationRecords {
    titles: Mutex<FxHashMap<String, String>>,
}

impl InMemoryConversationRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Title recorded for a conversation, if one exists.
    #[must_use]
    pub fn title(&self, conversation_id: &str) -> Option<String> {
        let titles = self.titles.lock().expect("records map poisoned");
        titles.get(conversation_id).cloned()
    }
}

#[async_trait]
impl ConversationRecords for InMemoryConversationRecords {
    async fn ensure(&self, conversation_id: &str, title_hint: &str) -> Result<(), RecordsError> {
        let mut titles = self.titles.lock().expect("records map poisoned");
        titles
            .entry(conversation_id.to_string())
            .or_insert_with(|| title_hint.to_string());
        Ok(())
    }
}
