//! Status events - inputs of the request status machine

use serde::{Deserialize, Serialize};

/// Events that move a conversation between request statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// A chat request was accepted.
    RequestStarted { request_id: String },

    /// The loop finished without cancellation.
    RequestCompleted,

    /// The client aborted the running request.
    AbortRequested,

    /// The provider or transport failed.
    RequestFailed { error: String },
}

impl StatusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::RequestStarted { .. } => "request_started",
            StatusEvent::RequestCompleted => "request_completed",
            StatusEvent::AbortRequested => "abort_requested",
            StatusEvent::RequestFailed { .. } => "request_failed",
        }
    }
}
