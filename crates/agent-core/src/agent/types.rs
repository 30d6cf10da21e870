use chat_core::{Role as TreeRole, TreeSnapshot};
use chat_state::{ConversationSummary, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::ToolCall;

/// Longest title derived from the first user message.
const TITLE_CHARS: usize = 40;

/// Role of a provider message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message in the shape providers consume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Persisted conversation: the tree as of `last_event_id`.
///
/// Every event with an id at or below `last_event_id` is already folded into
/// `snapshot`; replaying the later ones brings it up to date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snapshot: TreeSnapshot,
    #[serde(default)]
    pub last_event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: String::new(),
            snapshot: TreeSnapshot::new(),
            last_event_id: 0,
            model: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the snapshot and its event watermark.
    pub fn update_snapshot(&mut self, snapshot: TreeSnapshot, last_event_id: EventId) {
        self.snapshot = snapshot;
        self.last_event_id = last_event_id;
        if self.title.is_empty() {
            self.title = derive_title(&self.snapshot);
        }
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.snapshot.messages.len(),
        }
    }
}

/// First line of the first user message, shortened.
pub fn derive_title(snapshot: &TreeSnapshot) -> String {
    snapshot
        .messages
        .iter()
        .find(|message| message.role == TreeRole::User)
        .map(|message| message.text())
        .and_then(|text| text.lines().map(str::trim).find(|line| !line.is_empty()).map(str::to_string))
        .map(|line| line.chars().take(TITLE_CHARS).collect())
        .unwrap_or_default()
}
