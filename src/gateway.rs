//! The model gateway seam.
//!
//! The execution graph never talks to a provider directly; it hands the
//! ordered history and available tool schemas to a [`ModelGateway`] and gets
//! back one assistant turn. Provider adapters live outside this crate.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, ToolRequest};

/// Description of one callable tool, in the JSON-schema shape providers
/// expect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Everything a gateway needs for one model turn.
#[derive(Debug)]
pub struct ModelRequest<'a> {
    /// Model identifier; `None` means the gateway's default.
    pub model: Option<&'a str>,
    /// System prompt prepended by the gateway, not part of the history.
    pub system_prompt: Option<&'a str>,
    /// Full ordered history, feedback carriers included — the model sees
    /// reviewer feedback as a tool result.
    pub messages: &'a [Message],
    /// Schemas of the tools the model may request.
    pub tools: &'a [ToolSchema],
}

/// One assistant turn: text, tool requests, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantTurn {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_requests: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_requests(content: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            content: content.into(),
            tool_requests,
        }
    }
}

/// Gateway failures. Any of these fails the run; the graph persists nothing
/// for the failed turn.
#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    #[error("model provider error: {message}")]
    #[diagnostic(
        code(threadloom::gateway::provider),
        help("check provider credentials and connectivity; the conversation checkpoint is intact")
    )]
    Provider { message: String },

    #[error("unknown model '{model}'")]
    #[diagnostic(code(threadloom::gateway::unknown_model))]
    UnknownModel { model: String },

    #[error("malformed provider response: {reason}")]
    #[diagnostic(code(threadloom::gateway::malformed_response))]
    MalformedResponse { reason: String },
}

/// Boundary to the language model. Implementations must be `Send + Sync`;
/// one gateway instance serves many concurrent runs.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<AssistantTurn, GatewayError>;
}
