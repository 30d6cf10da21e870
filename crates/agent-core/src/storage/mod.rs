//! Conversation persistence
//!
//! The server depends only on the [`Storage`] trait. Conversations are
//! stored as a snapshot plus an append-only event log; list pages are
//! ordered by `(updated_at, id)`, newest first.

mod jsonl;
mod memory;

use async_trait::async_trait;
use chat_state::{ChatEventEnvelope, ConversationSummary, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::Conversation;

pub use jsonl::JsonlStorage;
pub use memory::MemoryStorage;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid conversation id: {0:?}")]
    InvalidId(String),

    #[error("Invalid list cursor: {0:?}")]
    InvalidCursor(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<usize>,
    /// Opaque cursor from a previous page's `next_cursor`.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub conversations: Vec<ConversationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Conversation>>;
    async fn save(&self, conversation: &Conversation) -> Result<()>;
    /// Removes the conversation and its event log. `false` when nothing existed.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn list(&self, query: &ListQuery) -> Result<ConversationPage>;

    async fn append_event(&self, conversation_id: &str, event: &ChatEventEnvelope) -> Result<()>;
    /// Persisted events with `event_id > last_event_id`, in id order.
    async fn load_events_after(
        &self,
        conversation_id: &str,
        last_event_id: Option<EventId>,
    ) -> Result<Vec<ChatEventEnvelope>>;
    /// Highest persisted event id, 0 when the log is empty.
    async fn last_event_id(&self, conversation_id: &str) -> Result<EventId>;
}

/// Ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

fn encode_cursor(summary: &ConversationSummary) -> String {
    format!("{}:{}", summary.updated_at.timestamp_micros(), summary.id)
}

fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, String)> {
    let invalid = || StorageError::InvalidCursor(cursor.to_string());
    let (micros, id) = cursor.split_once(':').ok_or_else(invalid)?;
    let micros: i64 = micros.parse().map_err(|_| invalid())?;
    let updated_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
    Ok((updated_at, id.to_string()))
}

/// Sorts newest first and cuts one page after the cursor.
pub(crate) fn paginate(
    mut summaries: Vec<ConversationSummary>,
    query: &ListQuery,
) -> Result<ConversationPage> {
    let key = |s: &ConversationSummary| (s.updated_at.timestamp_micros(), s.id.clone());
    summaries.sort_by(|a, b| key(b).cmp(&key(a)));

    if let Some(cursor) = &query.cursor {
        let (updated_at, id) = decode_cursor(cursor)?;
        let bound = (updated_at.timestamp_micros(), id);
        summaries.retain(|s| key(s) < bound);
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let has_more = summaries.len() > limit;
    summaries.truncate(limit);

    let next_cursor = if has_more {
        summaries.last().map(encode_cursor)
    } else {
        None
    };

    Ok(ConversationPage {
        conversations: summaries,
        next_cursor,
    })
}
