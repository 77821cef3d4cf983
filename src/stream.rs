//! Outward event stream.
//!
//! Converts conversation messages into the ordered events a client consumes,
//! and carries them over a flume channel from the running graph to the
//! caller. The stream for one run is finite: data events in append order,
//! then exactly one [`StreamEnd`].

use futures_util::Stream;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::PendingApproval;
use crate::message::{Message, ToolRequest};

/// One data event, serialized as `{ "type": ..., "data": ... }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutwardEvent {
    Human {
        id: String,
        content: String,
    },
    Ai {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolRequest>>,
    },
    Tool {
        id: String,
        call_id: String,
        name: String,
        content: String,
    },
    Error {
        id: String,
        content: String,
    },
}

impl OutwardEvent {
    /// The event for one history message, or `None` for messages that never
    /// go outward (reviewer-feedback carriers).
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Human { id, content } => Some(OutwardEvent::Human {
                id: id.clone(),
                content: content.clone(),
            }),
            Message::Assistant {
                id,
                content,
                tool_requests,
            } => Some(OutwardEvent::Ai {
                id: id.clone(),
                content: content.clone(),
                tool_calls: if tool_requests.is_empty() {
                    None
                } else {
                    Some(tool_requests.clone())
                },
            }),
            Message::ToolResult { feedback: true, .. } => None,
            Message::ToolResult {
                id,
                call_id,
                name,
                content,
                feedback: false,
            } => Some(OutwardEvent::Tool {
                id: id.clone(),
                call_id: call_id.clone(),
                name: name.clone(),
                content: content.clone(),
            }),
            Message::Error { id, content } => Some(OutwardEvent::Error {
                id: id.clone(),
                content: content.clone(),
            }),
        }
    }

    /// Replays a history as events, preserving order and filtering carriers.
    #[must_use]
    pub fn replay(messages: &[Message]) -> Vec<Self> {
        messages.iter().filter_map(Self::from_message).collect()
    }
}

/// How a run's stream terminated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StreamEnd {
    /// The run reached Done.
    Completed,
    /// The run parked on an approval; resume with a decision.
    Suspended { pending: PendingApproval },
    /// The run failed; an error event precedes this marker.
    Failed { error: String },
}

/// Items flowing over the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    Event(OutwardEvent),
    End(StreamEnd),
}

/// The receiving side dropped; the run should stop at its next emit point.
#[derive(Debug, Error, Diagnostic)]
#[error("event stream receiver dropped")]
#[diagnostic(code(threadloom::stream::closed))]
pub struct StreamClosed;

/// Sending half held by the running graph.
#[derive(Clone, Debug)]
pub struct RunEmitter {
    tx: flume::Sender<StreamItem>,
    closed_rx: flume::Receiver<()>,
}

impl RunEmitter {
    pub fn emit(&self, event: OutwardEvent) -> Result<(), StreamClosed> {
        self.tx
            .send(StreamItem::Event(event))
            .map_err(|_| StreamClosed)
    }

    /// Terminates the stream. Send failure is ignored: a dropped receiver at
    /// the end marker loses nothing.
    pub fn finish(&self, end: StreamEnd) {
        let _ = self.tx.send(StreamItem::End(end));
    }

    /// Resolves once the receiving [`EventStream`] has been dropped. Lets
    /// long-running work race against client disconnect instead of waiting
    /// for the next emit point.
    pub async fn closed(&self) {
        // Nothing is ever sent on this channel; recv only returns when the
        // stream's half drops.
        let _ = self.closed_rx.recv_async().await;
    }
}

/// Receiving half handed to the caller. Finite and not restartable.
#[derive(Debug)]
pub struct EventStream {
    rx: flume::Receiver<StreamItem>,
    _closed_tx: flume::Sender<()>,
}

impl EventStream {
    /// Next item, or `None` once the channel is drained after the sender
    /// dropped.
    pub async fn recv(&self) -> Option<StreamItem> {
        self.rx.recv_async().await.ok()
    }

    /// Adapts the channel into a `futures_util::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = StreamItem> {
        futures_util::stream::unfold(self, |stream| async move {
            stream.rx.recv_async().await.ok().map(|item| (item, stream))
        })
    }

    /// Drains the full stream into memory. Test helper and small-history
    /// convenience.
    pub async fn collect(self) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item);
        }
        items
    }
}

/// Creates the emitter/stream pair for one run.
#[must_use]
pub fn channel() -> (RunEmitter, EventStream) {
    let (tx, rx) = flume::unbounded();
    let (closed_tx, closed_rx) = flume::bounded(0);
    (
        RunEmitter { tx, closed_rx },
        EventStream {
            rx,
            _closed_tx: closed_tx,
        },
    )
}
