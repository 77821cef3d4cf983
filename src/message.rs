//! Message types for conversations flowing through the execution graph.
//!
//! A conversation is an ordered sequence of [`Message`] values. The kinds are
//! a closed sum so every consumer matches exhaustively; an unhandled message
//! shape is a compile error, not a silently dropped event.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A model-issued request to invoke a named tool with structured arguments.
///
/// The `id` is the call id: unique within the assistant message that issued
/// the request, and referenced by exactly one later [`Message::ToolResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: FxHashMap<String, Value>,
}

impl ToolRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        args: FxHashMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// One entry in a conversation's message history.
///
/// # Serialization
///
/// Messages serialize with a `kind` tag so checkpoints round-trip without a
/// separate envelope:
///
/// ```
/// use threadloom::message::Message;
///
/// let msg = Message::human("What's the weather in Paris?");
/// let json = serde_json::to_string(&msg).unwrap();
/// let parsed: Message = serde_json::from_str(&json).unwrap();
/// assert_eq!(msg, parsed);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// User input.
    Human { id: String, content: String },
    /// Model output: text, tool requests, or both.
    Assistant {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_requests: Vec<ToolRequest>,
    },
    /// Result of one tool invocation, referencing the originating call id.
    ///
    /// `feedback` marks the synthetic carrier appended when a reviewer
    /// answers an approval pause with feedback text. It mutates the
    /// conversation like any other result but is never forwarded outward.
    ToolResult {
        id: String,
        call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        feedback: bool,
    },
    /// Terminal error surfaced into the history.
    Error { id: String, content: String },
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    /// Creates a user message.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            id: new_message_id(),
            content: content.into(),
        }
    }

    /// Creates a plain assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::assistant_with_requests(content, Vec::new())
    }

    /// Creates an assistant message carrying tool requests.
    #[must_use]
    pub fn assistant_with_requests(
        content: impl Into<String>,
        tool_requests: Vec<ToolRequest>,
    ) -> Self {
        Message::Assistant {
            id: new_message_id(),
            content: content.into(),
            tool_requests,
        }
    }

    /// Creates a tool result for the given call id.
    #[must_use]
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::ToolResult {
            id: new_message_id(),
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
            feedback: false,
        }
    }

    /// Creates the synthetic reviewer-feedback carrier for a parked call.
    #[must_use]
    pub fn feedback(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::ToolResult {
            id: new_message_id(),
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
            feedback: true,
        }
    }

    /// Creates an error message.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Message::Error {
            id: new_message_id(),
            content: content.into(),
        }
    }

    /// The message id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Message::Human { id, .. }
            | Message::Assistant { id, .. }
            | Message::ToolResult { id, .. }
            | Message::Error { id, .. } => id,
        }
    }

    /// The text content.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Message::Human { content, .. }
            | Message::Assistant { content, .. }
            | Message::ToolResult { content, .. }
            | Message::Error { content, .. } => content,
        }
    }

    /// Tool requests carried by an assistant message; empty for other kinds.
    #[must_use]
    pub fn tool_requests(&self) -> &[ToolRequest] {
        match self {
            Message::Assistant { tool_requests, .. } => tool_requests,
            _ => &[],
        }
    }

    /// True for the synthetic feedback carrier.
    #[must_use]
    pub fn is_feedback(&self) -> bool {
        matches!(self, Message::ToolResult { feedback: true, .. })
    }
}
