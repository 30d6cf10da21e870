//! Stream events - the wire union emitted while a request generates
//!
//! Provider output, tool activity and conversation metadata all travel as
//! one `StreamEvent` type so every consumer (server reducer, persistence,
//! client) folds the same records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Assistant text delta
    Content { text: String },

    /// Reasoning delta
    Thinking { text: String },

    ToolCall {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },

    ToolProgress {
        tool: String,
        stage: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        received_bytes: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },

    ToolResult {
        tool: String,
        /// String or arbitrary JSON; non-strings are stringified on apply.
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },

    Error { message: String },

    ConversationCreated { conversation: ConversationSummary },

    ConversationUpdated { conversation: ConversationSummary },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        StreamEvent::Thinking { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Wire discriminant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Content { .. } => "content",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolProgress { .. } => "tool_progress",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::ConversationCreated { .. } => "conversation_created",
            StreamEvent::ConversationUpdated { .. } => "conversation_updated",
        }
    }

    /// Metadata events go to the conversation list, not to message blocks.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            StreamEvent::ConversationCreated { .. } | StreamEvent::ConversationUpdated { .. }
        )
    }
}

/// Conversation list entry carried by metadata events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_discriminants_are_snake_case() {
        let event = StreamEvent::ToolProgress {
            tool: "fetch".to_string(),
            stage: "download".to_string(),
            message: "50%".to_string(),
            received_bytes: Some(512),
            total_bytes: Some(1024),
            call_id: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_progress");
        assert_eq!(value["receivedBytes"], 512);
        assert!(value.get("callId").is_none());
        assert_eq!(event.kind(), "tool_progress");
    }

    #[test]
    fn tool_result_accepts_any_json_payload() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"tool_result","tool":"calc","result":{"sum":3},"callId":"c1"}"#,
        )
        .unwrap();

        match event {
            StreamEvent::ToolResult { result, call_id, .. } => {
                assert_eq!(result["sum"], 3);
                assert_eq!(call_id.as_deref(), Some("c1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
