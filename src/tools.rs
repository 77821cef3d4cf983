//! Tool abstraction and registry.
//!
//! A [`ToolRegistry`] resolves the tools a run may use, optionally filtered
//! by an allow-list. The resolved set invokes tools by name and encodes
//! failures into result text so the model can react to them; a failed tool
//! never fails the run.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::gateway::ToolSchema;
use crate::message::{Message, ToolRequest};

/// A single invocable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> ToolSchema;
    async fn invoke(&self, args: &FxHashMap<String, Value>) -> Result<String, ToolError>;
}

/// Failure inside a tool implementation. Callers fold this into the
/// `ToolResult` content rather than propagating it.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("invalid arguments: {reason}")]
    #[diagnostic(code(threadloom::tools::invalid_args))]
    InvalidArgs { reason: String },

    #[error("{message}")]
    #[diagnostic(code(threadloom::tools::execution))]
    Execution { message: String },
}

/// Resolution failures.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("allow-list names unknown tool '{name}'")]
    #[diagnostic(
        code(threadloom::tools::unknown_tool),
        help("the allow-list may only name registered tools")
    )]
    UnknownTool { name: String },
}

/// Source of tools for a run. Resolution is async because registries may sit
/// in front of remote discovery.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn resolve(&self, allow_list: Option<&[String]>) -> Result<ResolvedTools, RegistryError>;
}

/// Registry over a fixed in-process set of tools.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }
}

impl fmt::Debug for StaticToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("StaticToolRegistry")
            .field("tools", &names)
            .finish()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn resolve(&self, allow_list: Option<&[String]>) -> Result<ResolvedTools, RegistryError> {
        let selected: Vec<Arc<dyn Tool>> = match allow_list {
            None => self.tools.clone(),
            Some(names) => {
                for name in names {
                    if !self.tools.iter().any(|t| t.name() == name) {
                        return Err(RegistryError::UnknownTool { name: name.clone() });
                    }
                }
                self.tools
                    .iter()
                    .filter(|t| names.iter().any(|n| n == t.name()))
                    .cloned()
                    .collect()
            }
        };
        Ok(ResolvedTools::new(selected))
    }
}

/// The tool set one graph instance executes against.
#[derive(Clone, Default)]
pub struct ResolvedTools {
    by_name: FxHashMap<String, Arc<dyn Tool>>,
}

impl ResolvedTools {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let by_name = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self { by_name }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Schemas handed to the gateway, sorted by name for stable prompts.
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.by_name.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Executes one request, producing exactly one `ToolResult` message.
    ///
    /// An unknown tool name or an invocation error is encoded into the
    /// result content; the caller keeps going.
    pub async fn execute(&self, request: &ToolRequest) -> Message {
        match self.by_name.get(&request.name) {
            None => {
                warn!(tool = %request.name, call_id = %request.id, "unknown tool requested");
                Message::tool_result(
                    &request.id,
                    &request.name,
                    format!("Error: tool '{}' is not available", request.name),
                )
            }
            Some(tool) => match tool.invoke(&request.args).await {
                Ok(content) => Message::tool_result(&request.id, &request.name, content),
                Err(err) => {
                    warn!(tool = %request.name, call_id = %request.id, error = %err, "tool invocation failed");
                    Message::tool_result(&request.id, &request.name, format!("Error: {err}"))
                }
            },
        }
    }
}

impl fmt::Debug for ResolvedTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ResolvedTools").field("tools", &names).finish()
    }
}
