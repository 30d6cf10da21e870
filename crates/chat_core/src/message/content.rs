//! Block - typed segments of a message
//!
//! A message is an ordered list of blocks. User messages carry content and
//! attachments, assistant messages carry content, research traces and errors.

use serde::{Deserialize, Serialize};

use super::Role;

/// A typed segment of message content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Block {
    /// Plain text
    Content { text: String },

    /// Uploaded files (user messages only)
    Attachments { attachments: Vec<Attachment> },

    /// Thinking and tool trace (assistant messages only)
    Research { items: Vec<ResearchItem> },

    /// Provider or loop failure (assistant messages only)
    Error { message: String },
}

impl Block {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Kind name used in validation messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Attachments { .. } => "attachments",
            Self::Research { .. } => "research",
            Self::Error { .. } => "error",
        }
    }

    /// Whether a message with `role` may carry this block.
    pub fn allowed_for(&self, role: Role) -> bool {
        match self {
            Self::Content { .. } => true,
            Self::Attachments { .. } => role == Role::User,
            Self::Research { .. } | Self::Error { .. } => role == Role::Assistant,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Content { text } => Some(text),
            _ => None,
        }
    }
}

/// Reference to a blob held by the attachment store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One entry of a research block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ResearchItem {
    Thinking {
        text: String,
    },
    Tool {
        call: ToolInvocation,
        #[serde(default)]
        progress: Vec<ToolProgress>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

impl ResearchItem {
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    pub fn tool(name: impl Into<String>, args: serde_json::Value, call_id: Option<String>) -> Self {
        Self::Tool {
            call: ToolInvocation {
                name: name.into(),
                args,
            },
            progress: Vec::new(),
            result: None,
            call_id,
        }
    }

    /// A tool item that has not received its result yet.
    pub fn is_open_tool(&self) -> bool {
        matches!(self, Self::Tool { result: None, .. })
    }
}

/// Name and arguments of a tool call as the model issued it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Progress report emitted while a tool runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolProgress {
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

/// Deep copy of a block list.
///
/// Snapshots handed to persistence must not share buffers with the live
/// session; `Vec<Block>` owns its data so a clone is a full copy.
pub fn clone_blocks(blocks: &[Block]) -> Vec<Block> {
    blocks.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_wire_format_uses_snake_case_tags() {
        let block = Block::Research {
            items: vec![ResearchItem::Tool {
                call: ToolInvocation {
                    name: "search".to_string(),
                    args: serde_json::json!({"q": "rust"}),
                },
                progress: Vec::new(),
                result: None,
                call_id: Some("call_1".to_string()),
            }],
        };

        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "research");
        assert_eq!(value["items"][0]["type"], "tool");
        assert_eq!(value["items"][0]["callId"], "call_1");
        assert!(value["items"][0].get("result").is_none());
    }

    #[test]
    fn role_restrictions() {
        let attachments = Block::Attachments {
            attachments: Vec::new(),
        };
        assert!(attachments.allowed_for(Role::User));
        assert!(!attachments.allowed_for(Role::Assistant));
        assert!(!Block::error("x").allowed_for(Role::User));
        assert!(Block::content("x").allowed_for(Role::Assistant));
    }
}
