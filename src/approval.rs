//! Approval pause bookkeeping: the parked tool request and the reviewer's
//! decision that unparks it.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::ToolRequest;

/// The marker persisted while a run is suspended waiting for review.
///
/// Exactly one request is parked per suspension: the last request of the
/// assistant turn that triggered the pause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub request: ToolRequest,
}

impl PendingApproval {
    #[must_use]
    pub fn new(request: ToolRequest) -> Self {
        Self { request }
    }
}

/// A reviewer's answer to a parked tool request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Execute the request as issued.
    Continue,
    /// Execute the request with replacement arguments.
    Update { args: FxHashMap<String, Value> },
    /// Do not execute; hand the reviewer's text back to the model instead.
    Feedback { text: String },
}

/// Rejection of a malformed wire-form decision. Raised before any state is
/// touched, so the run stays parked.
#[derive(Debug, Error, Diagnostic)]
pub enum DecisionError {
    #[error("unknown review action '{action}'")]
    #[diagnostic(
        code(threadloom::approval::unknown_action),
        help("valid actions are 'continue', 'update', and 'feedback'")
    )]
    UnknownAction { action: String },

    #[error("review action '{action}' payload is malformed: {reason}")]
    #[diagnostic(
        code(threadloom::approval::malformed_payload),
        help("'update' expects an object of replacement args; 'feedback' expects a string")
    )]
    MalformedPayload { action: String, reason: String },
}

impl ApprovalDecision {
    /// Parses the `{action, data}` wire form used by resume requests.
    ///
    /// Unknown actions and ill-typed payloads are rejected here, never
    /// deferred into the run.
    pub fn from_wire(action: &str, data: &Value) -> Result<Self, DecisionError> {
        match action {
            "continue" => Ok(ApprovalDecision::Continue),
            "update" => {
                let object = data.as_object().ok_or_else(|| {
                    DecisionError::MalformedPayload {
                        action: action.to_string(),
                        reason: "expected a JSON object of replacement args".to_string(),
                    }
                })?;
                let args = object
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Ok(ApprovalDecision::Update { args })
            }
            "feedback" => {
                let text = data.as_str().ok_or_else(|| DecisionError::MalformedPayload {
                    action: action.to_string(),
                    reason: "expected a JSON string of reviewer feedback".to_string(),
                })?;
                Ok(ApprovalDecision::Feedback {
                    text: text.to_string(),
                })
            }
            other => Err(DecisionError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}
