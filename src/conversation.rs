//! In-memory conversation state owned by a single run.
//!
//! A [`Conversation`] is the working copy the execution graph mutates; the
//! checkpoint module owns the durable form. Exactly one run holds a
//! conversation at a time.

use crate::approval::PendingApproval;
use crate::checkpoint::Checkpoint;
use crate::message::{Message, ToolRequest};

#[derive(Clone, Debug, Default)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub pending_approval: Option<PendingApproval>,
}

impl Conversation {
    /// Creates an empty conversation, the starting point when no checkpoint
    /// exists yet.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            pending_approval: None,
        }
    }

    /// Rehydrates the working copy from a durable checkpoint.
    #[must_use]
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.conversation_id.clone(),
            messages: checkpoint.messages.clone(),
            pending_approval: checkpoint.pending_approval.clone(),
        }
    }

    /// Produces the durable form at the given revision.
    #[must_use]
    pub fn to_checkpoint(&self, revision: u64) -> Checkpoint {
        Checkpoint::new(
            self.id.clone(),
            revision,
            self.messages.clone(),
            self.pending_approval.clone(),
        )
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Removes and returns the parked approval, if any.
    pub fn take_pending(&mut self) -> Option<PendingApproval> {
        self.pending_approval.take()
    }

    /// Tool requests of the most recent assistant message that are still
    /// unanswered, i.e. have no matching `ToolResult` after it.
    #[must_use]
    pub fn outstanding_requests(&self) -> Vec<ToolRequest> {
        let Some(turn_index) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };
        let requests = self.messages[turn_index].tool_requests();
        let answered: Vec<&str> = self.messages[turn_index + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        requests
            .iter()
            .filter(|r| !answered.contains(&r.id.as_str()))
            .cloned()
            .collect()
    }

    /// Replaces the args of the named call in its originating assistant
    /// message, so the history records what actually ran.
    pub fn update_request_args(
        &mut self,
        call_id: &str,
        args: rustc_hash::FxHashMap<String, serde_json::Value>,
    ) -> bool {
        for message in self.messages.iter_mut().rev() {
            if let Message::Assistant { tool_requests, .. } = message {
                if let Some(request) = tool_requests.iter_mut().find(|r| r.id == call_id) {
                    request.args = args;
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use serde_json::json;

    fn request(id: &str) -> ToolRequest {
        ToolRequest::new(id, "get_weather", FxHashMap::default())
    }

    #[test]
    fn outstanding_requests_skips_answered_calls() {
        let mut conv = Conversation::new("c1");
        conv.push(Message::human("weather?"));
        conv.push(Message::assistant_with_requests(
            "",
            vec![request("t1"), request("t2")],
        ));
        conv.push(Message::tool_result("t1", "get_weather", "sunny"));

        let outstanding = conv.outstanding_requests();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].id, "t2");
    }

    #[test]
    fn outstanding_requests_only_looks_at_latest_turn() {
        let mut conv = Conversation::new("c1");
        conv.push(Message::assistant_with_requests("", vec![request("t1")]));
        conv.push(Message::tool_result("t1", "get_weather", "sunny"));
        conv.push(Message::assistant("all done"));
        assert!(conv.outstanding_requests().is_empty());
    }

    #[test]
    fn update_request_args_targets_the_named_call() {
        let mut conv = Conversation::new("c1");
        conv.push(Message::assistant_with_requests(
            "",
            vec![request("t1"), request("t2")],
        ));
        let mut args = FxHashMap::default();
        args.insert("city".to_string(), json!("London"));
        assert!(conv.update_request_args("t2", args));

        let requests = conv.messages[0].tool_requests();
        assert!(requests[0].args.is_empty());
        assert_eq!(requests[1].args["city"], json!("London"));
    }

    #[test]
    fn checkpoint_round_trip_preserves_pending() {
        let mut conv = Conversation::new("c1");
        conv.push(Message::human("hi"));
        conv.pending_approval = Some(PendingApproval::new(request("t1")));

        let checkpoint = conv.to_checkpoint(3);
        assert_eq!(checkpoint.revision, 3);

        let restored = Conversation::from_checkpoint(&checkpoint);
        assert_eq!(restored.messages, conv.messages);
        assert_eq!(restored.pending_approval, conv.pending_approval);
    }
}
