//! Per-run execution options.

use serde::{Deserialize, Serialize};

/// Immutable configuration for one `run()` invocation.
///
/// Options never change mid-run; a new request with different options builds
/// (or reuses from cache) a different execution graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Model identifier forwarded to the gateway; `None` lets the gateway
    /// pick its default.
    pub model: Option<String>,
    /// Tool allow-list; `None` exposes every registered tool.
    pub tools: Option<Vec<String>>,
    /// Skip the approval pause and execute tool requests directly.
    pub auto_approve: bool,
    /// System prompt forwarded to the gateway; never persisted into the
    /// conversation history.
    pub system_prompt: Option<String>,
}

impl ExecutionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Deterministic cache key for graph reuse. Allow-list order does not
    /// matter, so it is sorted before keying.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let model = self.model.as_deref().unwrap_or("default");
        let tools = match &self.tools {
            Some(names) => {
                let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted.join(",")
            }
            None => "*".to_string(),
        };
        let prompt = self.system_prompt.as_deref().unwrap_or("");
        format!("{model}|{tools}|{}|{prompt}", self.auto_approve)
    }
}
