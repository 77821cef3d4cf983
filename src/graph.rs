//! The human-in-the-loop execution graph.
//!
//! One [`ExecutionGraph`] instance is immutable and shared across runs; all
//! per-conversation state lives in the checkpoint store. A run sequences
//! Agent → ToolApproval → Tools → Agent cycles until the model stops
//! requesting tools, pausing for review whenever `auto_approve` is off.
//!
//! Suspension is a value, not control flow: a parked run returns
//! `Ok(RunOutcome::Suspended { .. })` and a later run carrying the reviewer's
//! decision picks up from the checkpoint.
//!
//! Ordering invariant: every transition that appends messages persists the
//! checkpoint before emitting outward events, so a dropped stream or a crash
//! between save and delivery loses only the notification, never state.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::approval::{ApprovalDecision, PendingApproval};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::conversation::Conversation;
use crate::gateway::{ModelGateway, ModelRequest};
use crate::message::Message;
use crate::options::ExecutionOptions;
use crate::stream::{OutwardEvent, RunEmitter, StreamClosed};
use crate::tools::ResolvedTools;

/// What starts (or resumes) a run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunInput {
    /// A new user message.
    UserText(String),
    /// The reviewer's answer to a parked approval.
    Decision(ApprovalDecision),
}

/// How a run ended, when it didn't fail.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed,
    /// Parked on review; the checkpoint carries the same marker.
    Suspended { pending: PendingApproval },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GraphState {
    Agent,
    ToolApproval,
    Tools,
    Done,
}

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),

    #[error("conversation {conversation_id} has no pending approval to resume")]
    #[diagnostic(
        code(threadloom::graph::no_pending_approval),
        help("decisions are only valid while a run is suspended on a tool approval")
    )]
    NoPendingApproval { conversation_id: String },

    #[error("conversation {conversation_id} is awaiting a tool approval decision")]
    #[diagnostic(
        code(threadloom::graph::approval_pending),
        help("answer the pending approval (continue/update/feedback) before sending new text")
    )]
    ApprovalPending { conversation_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    StreamClosed(#[from] StreamClosed),
}

/// Immutable per-options graph. Cheap to clone behind `Arc`; the service
/// caches instances keyed by their options.
pub struct ExecutionGraph {
    gateway: Arc<dyn ModelGateway>,
    tools: ResolvedTools,
    options: ExecutionOptions,
}

impl std::fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("tools", &self.tools)
            .field("options", &self.options)
            .finish()
    }
}

impl ExecutionGraph {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        tools: ResolvedTools,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            gateway,
            tools,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Runs the graph for one input until completion or suspension.
    ///
    /// Failure leaves the checkpoint at the last successful save; the
    /// failing model turn is never persisted.
    #[instrument(skip(self, input, store, emitter), fields(conversation_id = %conversation_id), err)]
    pub async fn run(
        &self,
        conversation_id: &str,
        input: RunInput,
        store: &dyn CheckpointStore,
        emitter: &RunEmitter,
    ) -> Result<RunOutcome, GraphError> {
        let checkpoint = store.load(conversation_id).await?;
        let mut revision = checkpoint.as_ref().map(|c| c.revision).unwrap_or(0);
        let mut conversation = match &checkpoint {
            Some(checkpoint) => Conversation::from_checkpoint(checkpoint),
            None => Conversation::new(conversation_id),
        };

        let mut state = self.apply_input(&mut conversation, input)?;
        self.persist(&conversation, &mut revision, store).await?;

        loop {
            debug!(?state, revision, "graph step");
            state = match state {
                GraphState::Agent => {
                    self.agent_step(&mut conversation, &mut revision, store, emitter)
                        .await?
                }
                GraphState::ToolApproval => {
                    if self.options.auto_approve {
                        GraphState::Tools
                    } else {
                        return self
                            .suspend(&mut conversation, &mut revision, store)
                            .await;
                    }
                }
                GraphState::Tools => {
                    self.tools_step(&mut conversation, &mut revision, store, emitter)
                        .await?
                }
                GraphState::Done => return Ok(RunOutcome::Completed),
            };
        }
    }

    /// Mutates the conversation for the incoming input and picks the first
    /// state. Synchronous: every rejection here happens before any save.
    fn apply_input(
        &self,
        conversation: &mut Conversation,
        input: RunInput,
    ) -> Result<GraphState, GraphError> {
        match input {
            RunInput::UserText(text) => {
                if conversation.pending_approval.is_some() {
                    return Err(GraphError::ApprovalPending {
                        conversation_id: conversation.id.clone(),
                    });
                }
                conversation.push(Message::human(text));
                Ok(GraphState::Agent)
            }
            RunInput::Decision(decision) => {
                let pending = conversation.take_pending().ok_or_else(|| {
                    GraphError::NoPendingApproval {
                        conversation_id: conversation.id.clone(),
                    }
                })?;
                match decision {
                    ApprovalDecision::Continue => Ok(GraphState::Tools),
                    ApprovalDecision::Update { args } => {
                        if !conversation.update_request_args(&pending.request.id, args) {
                            warn!(
                                call_id = %pending.request.id,
                                "parked call id not found in history; executing with original args"
                            );
                        }
                        Ok(GraphState::Tools)
                    }
                    ApprovalDecision::Feedback { text } => {
                        conversation.push(Message::feedback(
                            &pending.request.id,
                            &pending.request.name,
                            text,
                        ));
                        Ok(GraphState::Agent)
                    }
                }
            }
        }
    }

    async fn agent_step(
        &self,
        conversation: &mut Conversation,
        revision: &mut u64,
        store: &dyn CheckpointStore,
        emitter: &RunEmitter,
    ) -> Result<GraphState, GraphError> {
        let schemas = self.tools.schemas();
        let invoke = self.gateway.invoke(ModelRequest {
            model: self.options.model.as_deref(),
            system_prompt: self.options.system_prompt.as_deref(),
            messages: &conversation.messages,
            tools: &schemas,
        });
        // Race the model call against client disconnect so a dropped stream
        // aborts promptly instead of waiting for the next emit point. Biased:
        // a turn the model already finished is persisted, never discarded.
        let turn = tokio::select! {
            biased;
            turn = invoke => turn?,
            () = emitter.closed() => return Err(StreamClosed.into()),
        };

        let has_requests = !turn.tool_requests.is_empty();
        let message = Message::assistant_with_requests(turn.content, turn.tool_requests);
        let event = OutwardEvent::from_message(&message);
        conversation.push(message);
        self.persist(conversation, revision, store).await?;
        if let Some(event) = event {
            emitter.emit(event)?;
        }

        Ok(if has_requests {
            GraphState::ToolApproval
        } else {
            GraphState::Done
        })
    }

    async fn tools_step(
        &self,
        conversation: &mut Conversation,
        revision: &mut u64,
        store: &dyn CheckpointStore,
        emitter: &RunEmitter,
    ) -> Result<GraphState, GraphError> {
        let requests = conversation.outstanding_requests();
        let mut results = Vec::with_capacity(requests.len());
        for request in &requests {
            results.push(self.tools.execute(request).await);
        }

        let events: Vec<_> = results
            .iter()
            .filter_map(OutwardEvent::from_message)
            .collect();
        for result in results {
            conversation.push(result);
        }
        self.persist(conversation, revision, store).await?;
        for event in events {
            emitter.emit(event)?;
        }
        Ok(GraphState::Agent)
    }

    /// Parks the last outstanding request and checkpoints the marker before
    /// returning control.
    async fn suspend(
        &self,
        conversation: &mut Conversation,
        revision: &mut u64,
        store: &dyn CheckpointStore,
    ) -> Result<RunOutcome, GraphError> {
        let request = conversation
            .outstanding_requests()
            .into_iter()
            .next_back()
            .expect("ToolApproval is only entered with outstanding requests");
        let pending = PendingApproval::new(request);
        conversation.pending_approval = Some(pending.clone());
        self.persist(conversation, revision, store).await?;
        Ok(RunOutcome::Suspended { pending })
    }

    async fn persist(
        &self,
        conversation: &Conversation,
        revision: &mut u64,
        store: &dyn CheckpointStore,
    ) -> Result<(), GraphError> {
        *revision += 1;
        store.save(conversation.to_checkpoint(*revision)).await?;
        Ok(())
    }
}
