//! # Threadloom: Human-in-the-loop Conversational Agent Core
//!
//! Threadloom sequences model turns, tool-approval pauses, and tool execution
//! for a conversation, with durable checkpoint/resume and an ordered outward
//! event stream.
//!
//! ## Core Concepts
//!
//! - **Messages**: Tagged conversation history entries
//! - **Execution Graph**: Agent → ToolApproval → Tools → Agent state machine
//! - **Checkpoints**: Latest-state snapshots with optimistic concurrency
//! - **Approval**: Suspension as a value; resume with continue/update/feedback
//! - **Streams**: Append-ordered outward events with an explicit end marker
//!
//! ## Quick Start
//!
//! ### Working with Messages
//!
//! ```
//! use threadloom::message::Message;
//!
//! let user_msg = Message::human("What's the weather in Paris?");
//! let assistant_msg = Message::assistant("Let me check that for you.");
//!
//! assert_eq!(user_msg.content(), "What's the weather in Paris?");
//! assert!(assistant_msg.tool_requests().is_empty());
//! ```
//!
//! ### Running a Conversation
//!
//! Wire a [`service::AgentService`] from your gateway, registry, checkpoint
//! store, and records backend, then drive it:
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadloom::checkpoint::InMemoryCheckpointStore;
//! use threadloom::graph::RunInput;
//! use threadloom::options::ExecutionOptions;
//! use threadloom::records::InMemoryConversationRecords;
//! use threadloom::service::AgentService;
//! use threadloom::stream::StreamItem;
//! use threadloom::tools::StaticToolRegistry;
//!
//! # async fn demo(gateway: Arc<dyn threadloom::gateway::ModelGateway>) -> miette::Result<()> {
//! let service = AgentService::new(
//!     gateway,
//!     Arc::new(StaticToolRegistry::new()),
//!     Arc::new(InMemoryCheckpointStore::new()),
//!     Arc::new(InMemoryConversationRecords::new()),
//! );
//!
//! let stream = service
//!     .run(
//!         "conversation-1",
//!         RunInput::UserText("What's the weather in Paris?".into()),
//!         ExecutionOptions::new(),
//!     )
//!     .await
//!     .map_err(|e| miette::miette!(e.to_string()))?;
//!
//! while let Some(item) = stream.recv().await {
//!     match item {
//!         StreamItem::Event(event) => println!("{event:?}"),
//!         StreamItem::End(end) => println!("finished: {end:?}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A run that pauses for approval ends its stream with
//! `StreamEnd::Suspended`; resume it by calling `run` again with
//! `RunInput::Decision`.
//!
//! ## Module Guide
//!
//! - [`message`] - Conversation message types
//! - [`approval`] - Pending approvals and reviewer decisions
//! - [`conversation`] - In-memory working state for one run
//! - [`gateway`] - Model gateway seam
//! - [`tools`] - Tool trait, registry, and resolved tool sets
//! - [`graph`] - The execution state machine
//! - [`checkpoint`] - Durable checkpoint stores
//! - [`stream`] - Outward events and the run event channel
//! - [`service`] - Caller-facing facade
//! - [`telemetry`] - Tracing setup

pub mod approval;
pub mod cache;
pub mod checkpoint;
pub mod conversation;
pub mod gateway;
pub mod graph;
pub mod message;
pub mod options;
pub mod records;
pub mod service;
pub mod stream;
pub mod telemetry;
pub mod tools;
