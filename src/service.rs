//! Caller-facing facade over the execution graph.
//!
//! [`AgentService`] owns the shared collaborators (gateway, registry,
//! checkpoint store, records) and hands each `run()` call a finite event
//! stream. Runs for the same conversation are serialized: a second caller is
//! rejected with [`ServiceError::ConversationBusy`] while one is in flight.

use std::sync::{Arc, Mutex};

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::cache::GraphCache;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::gateway::ModelGateway;
use crate::graph::{ExecutionGraph, GraphError, RunInput, RunOutcome};
use crate::message::Message;
use crate::options::ExecutionOptions;
use crate::records::{ConversationRecords, RecordsError};
use crate::stream::{self, EventStream, OutwardEvent, StreamEnd};
use crate::tools::{RegistryError, ToolRegistry};

const TITLE_HINT_MAX_CHARS: usize = 48;

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("conversation {conversation_id} already has a run in flight")]
    #[diagnostic(
        code(threadloom::service::busy),
        help("wait for the active stream to end, then retry")
    )]
    ConversationBusy { conversation_id: String },

    #[error("conversation {conversation_id} has no pending approval to resume")]
    #[diagnostic(code(threadloom::service::no_pending_approval))]
    NoPendingApproval { conversation_id: String },

    #[error("conversation {conversation_id} is awaiting a tool approval decision")]
    #[diagnostic(
        code(threadloom::service::approval_pending),
        help("answer the pending approval (continue/update/feedback) before sending new text")
    )]
    ApprovalPending { conversation_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Records(#[from] RecordsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),
}

pub struct AgentService {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<dyn ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    records: Arc<dyn ConversationRecords>,
    graphs: GraphCache,
    active: Arc<Mutex<FxHashSet<String>>>,
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("graphs", &self.graphs)
            .finish()
    }
}

/// Releases the per-conversation busy slot when the run ends, on every path.
struct RunGuard {
    active: Arc<Mutex<FxHashSet<String>>>,
    conversation_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().expect("active set poisoned");
        active.remove(&self.conversation_id);
    }
}

impl AgentService {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<dyn ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
        records: Arc<dyn ConversationRecords>,
    ) -> Self {
        Self {
            gateway,
            registry,
            store,
            records,
            graphs: GraphCache::new(),
            active: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    #[must_use]
    pub fn with_graph_cache_capacity(mut self, capacity: usize) -> Self {
        self.graphs = GraphCache::with_capacity(capacity);
        self
    }

    /// Starts (or resumes) one run and returns its event stream.
    ///
    /// Rejections happen synchronously, before any state changes: a busy
    /// conversation, a decision without a parked approval, or user text
    /// while one is parked. Once this returns `Ok`, events arrive in append
    /// order and the stream terminates with exactly one [`StreamEnd`].
    #[instrument(skip(self, input, options), fields(conversation_id = %conversation_id), err)]
    pub async fn run(
        &self,
        conversation_id: &str,
        input: RunInput,
        options: ExecutionOptions,
    ) -> Result<EventStream, ServiceError> {
        let guard = self.acquire(conversation_id)?;

        let pending = self
            .store
            .load(conversation_id)
            .await?
            .and_then(|c| c.pending_approval);
        match (&input, pending.is_some()) {
            (RunInput::Decision(_), false) => {
                return Err(ServiceError::NoPendingApproval {
                    conversation_id: conversation_id.to_string(),
                });
            }
            (RunInput::UserText(_), true) => {
                return Err(ServiceError::ApprovalPending {
                    conversation_id: conversation_id.to_string(),
                });
            }
            _ => {}
        }

        self.records
            .ensure(conversation_id, &title_hint(&input))
            .await?;

        let graph = self.graph_for(&options).await?;
        let (emitter, stream) = stream::channel();
        let store = Arc::clone(&self.store);
        let conversation_id = conversation_id.to_string();

        tokio::spawn(async move {
            match graph.run(&conversation_id, input, &*store, &emitter).await {
                Ok(RunOutcome::Completed) => {
                    info!(%conversation_id, "run completed");
                    emitter.finish(StreamEnd::Completed);
                }
                Ok(RunOutcome::Suspended { pending }) => {
                    info!(%conversation_id, tool = %pending.request.name, "run suspended for approval");
                    emitter.finish(StreamEnd::Suspended { pending });
                }
                Err(GraphError::StreamClosed(_)) => {
                    // Receiver gone; the checkpoint already holds everything.
                    info!(%conversation_id, "run cancelled by dropped stream");
                }
                Err(err) => {
                    error!(%conversation_id, error = %err, "run failed");
                    let message = Message::error(err.to_string());
                    if let Some(event) = OutwardEvent::from_message(&message) {
                        let _ = emitter.emit(event);
                    }
                    emitter.finish(StreamEnd::Failed {
                        error: err.to_string(),
                    });
                }
            }
            // Free the busy slot before the emitter drops, so a caller who
            // drained the stream can retry immediately.
            drop(guard);
        });

        Ok(stream)
    }

    /// Reconstructs the outward events of a conversation from its latest
    /// checkpoint. Executes nothing; idempotent.
    #[instrument(skip(self), fields(conversation_id = %conversation_id), err)]
    pub async fn history(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<OutwardEvent>, ServiceError> {
        let checkpoint = self.store.load(conversation_id).await?;
        Ok(match checkpoint {
            Some(checkpoint) => OutwardEvent::replay(&checkpoint.messages),
            None => Vec::new(),
        })
    }

    fn acquire(&self, conversation_id: &str) -> Result<RunGuard, ServiceError> {
        let mut active = self.active.lock().expect("active set poisoned");
        if !active.insert(conversation_id.to_string()) {
            return Err(ServiceError::ConversationBusy {
                conversation_id: conversation_id.to_string(),
            });
        }
        Ok(RunGuard {
            active: Arc::clone(&self.active),
            conversation_id: conversation_id.to_string(),
        })
    }

    async fn graph_for(
        &self,
        options: &ExecutionOptions,
    ) -> Result<Arc<ExecutionGraph>, ServiceError> {
        let key = options.cache_key();
        if let Some(graph) = self.graphs.get(&key) {
            return Ok(graph);
        }
        let tools = self.registry.resolve(options.tools.as_deref()).await?;
        let graph = Arc::new(ExecutionGraph::new(
            Arc::clone(&self.gateway),
            tools,
            options.clone(),
        ));
        self.graphs.insert(key, Arc::clone(&graph));
        Ok(graph)
    }
}

/// First line of the conversation title, derived from the opening message.
fn title_hint(input: &RunInput) -> String {
    match input {
        RunInput::UserText(text) => text.chars().take(TITLE_HINT_MAX_CHARS).collect(),
        RunInput::Decision(_) => "Conversation".to_string(),
    }
}
