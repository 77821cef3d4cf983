//! Serde-friendly persisted checkpoint shape.
//!
//! Storage backends serialize this form instead of the in-memory
//! [`Checkpoint`] so the durable layout can evolve without touching runtime
//! types. Timestamps persist as RFC3339 strings.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::PendingApproval;
use crate::checkpoint::Checkpoint;
use crate::message::Message;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub conversation_id: String,
    pub revision: u64,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<PendingApproval>,
    pub created_at: String,
}

#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("invalid created_at timestamp '{value}': {source}")]
    #[diagnostic(code(threadloom::checkpoint::persistence::timestamp))]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("checkpoint JSON error: {0}")]
    #[diagnostic(code(threadloom::checkpoint::persistence::json))]
    Json(#[from] serde_json::Error),
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            conversation_id: checkpoint.conversation_id.clone(),
            revision: checkpoint.revision,
            messages: checkpoint.messages.clone(),
            pending_approval: checkpoint.pending_approval.clone(),
            created_at: checkpoint.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(persisted: PersistedCheckpoint) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&persisted.created_at)
            .map_err(|source| PersistenceError::Timestamp {
                value: persisted.created_at.clone(),
                source,
            })?
            .with_timezone(&Utc);
        Ok(Checkpoint {
            conversation_id: persisted.conversation_id,
            revision: persisted.revision,
            messages: persisted.messages,
            pending_approval: persisted.pending_approval,
            created_at,
        })
    }
}

impl PersistedCheckpoint {
    /// JSON for the snapshot column.
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::PendingApproval;
    use crate::message::ToolRequest;
    use rustc_hash::FxHashMap;

    #[test]
    fn round_trips_through_json() {
        let checkpoint = Checkpoint::new(
            "c1".to_string(),
            4,
            vec![Message::human("hi"), Message::assistant("hello")],
            Some(PendingApproval::new(ToolRequest::new(
                "t1",
                "get_weather",
                FxHashMap::default(),
            ))),
        );

        let persisted = PersistedCheckpoint::from(&checkpoint);
        let json = persisted.to_json().unwrap();
        let restored: Checkpoint = PersistedCheckpoint::from_json(&json)
            .unwrap()
            .try_into()
            .unwrap();

        assert_eq!(restored.conversation_id, checkpoint.conversation_id);
        assert_eq!(restored.revision, checkpoint.revision);
        assert_eq!(restored.messages, checkpoint.messages);
        assert_eq!(restored.pending_approval, checkpoint.pending_approval);
        assert_eq!(
            restored.created_at.timestamp_millis(),
            checkpoint.created_at.timestamp_millis()
        );
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let persisted = PersistedCheckpoint {
            conversation_id: "c1".to_string(),
            revision: 1,
            messages: Vec::new(),
            pending_approval: None,
            created_at: "not a time".to_string(),
        };
        let err = Checkpoint::try_from(persisted).unwrap_err();
        assert!(matches!(err, PersistenceError::Timestamp { .. }));
    }
}
