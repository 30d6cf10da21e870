//! Event reducer - folds stream events into a tree snapshot
//!
//! The reducer is a pure function of `(snapshot, event, timestamp)`. The
//! server, persistence replays and the client each run it over the same
//! events and must end with identical snapshots, so the timestamp of a newly
//! opened assistant message comes from the caller (the persisted event's
//! `createdAt`), never from the clock.

use chrono::{DateTime, Utc};

use chat_core::{Block, ResearchItem, Role, ToolProgress, TreeSnapshot};

use crate::event::{ConversationSummary, StreamEvent};
use crate::protocol::ChatEventEnvelope;

/// Conversation list change surfaced by a metadata event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationChange {
    Created(ConversationSummary),
    Updated(ConversationSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub snapshot: TreeSnapshot,
    /// Set for metadata events; the snapshot is untouched in that case.
    pub change: Option<ConversationChange>,
}

/// Reuses the assistant message at the end of the active path, or opens an
/// empty one created at `at`.
pub fn ensure_assistant_target(state: TreeSnapshot, at: DateTime<Utc>) -> TreeSnapshot {
    match state.last_message() {
        Some(message) if message.role == Role::Assistant => state,
        _ => state.add_message(Role::Assistant, Vec::new(), Some(at)).0,
    }
}

/// Applies one delta to the tail of an assistant message's blocks.
pub fn apply_assistant_addition(blocks: &mut Vec<Block>, event: &StreamEvent) {
    match event {
        StreamEvent::Content { text } => {
            if text.is_empty() {
                return;
            }
            match blocks.last_mut() {
                Some(Block::Content { text: existing }) => existing.push_str(text),
                _ => blocks.push(Block::content(text.clone())),
            }
        }
        StreamEvent::Thinking { text } => {
            if text.is_empty() {
                return;
            }
            match blocks.last_mut() {
                Some(Block::Research { items }) => match items.last_mut() {
                    Some(ResearchItem::Thinking { text: existing }) => existing.push_str(text),
                    _ => items.push(ResearchItem::thinking(text.clone())),
                },
                _ => blocks.push(Block::Research {
                    items: vec![ResearchItem::thinking(text.clone())],
                }),
            }
        }
        StreamEvent::ToolCall {
            tool,
            args,
            call_id,
        } => {
            let item = ResearchItem::tool(tool.clone(), args.clone(), call_id.clone());
            match blocks.last_mut() {
                Some(Block::Research { items }) => items.push(item),
                _ => blocks.push(Block::Research { items: vec![item] }),
            }
        }
        StreamEvent::ToolProgress {
            tool,
            stage,
            message,
            received_bytes,
            total_bytes,
            call_id,
        } => match open_tool_item(blocks, call_id.as_deref()) {
            Some(ResearchItem::Tool { progress, .. }) => progress.push(ToolProgress {
                stage: stage.clone(),
                message: message.clone(),
                received_bytes: *received_bytes,
                total_bytes: *total_bytes,
            }),
            _ => log::debug!("Dropping tool_progress for {}: no open tool call", tool),
        },
        StreamEvent::ToolResult {
            tool,
            result,
            call_id,
        } => match open_tool_item(blocks, call_id.as_deref()) {
            Some(ResearchItem::Tool { result: slot, .. }) => {
                *slot = Some(stable_json_string(result));
            }
            _ => log::debug!("Dropping tool_result for {}: no open tool call", tool),
        },
        StreamEvent::Error { message } => blocks.push(Block::error(message.clone())),
        StreamEvent::ConversationCreated { .. } | StreamEvent::ConversationUpdated { .. } => {}
    }
}

/// Applies one event. Metadata events leave the snapshot untouched and are
/// handed back as a [`ConversationChange`].
pub fn reduce(state: TreeSnapshot, event: &StreamEvent, at: DateTime<Utc>) -> Reduction {
    match event {
        StreamEvent::ConversationCreated { conversation } => Reduction {
            snapshot: state,
            change: Some(ConversationChange::Created(conversation.clone())),
        },
        StreamEvent::ConversationUpdated { conversation } => Reduction {
            snapshot: state,
            change: Some(ConversationChange::Updated(conversation.clone())),
        },
        _ => {
            let mut snapshot = ensure_assistant_target(state, at);
            if let Some(target) = snapshot.last_message_mut() {
                apply_assistant_addition(&mut target.blocks, event);
            }
            Reduction {
                snapshot,
                change: None,
            }
        }
    }
}

/// Folds persisted envelopes in order.
pub fn replay(
    state: TreeSnapshot,
    events: &[ChatEventEnvelope],
) -> (TreeSnapshot, Vec<ConversationChange>) {
    events
        .iter()
        .fold((state, Vec::new()), |(snapshot, mut changes), envelope| {
            let reduction = reduce(snapshot, &envelope.event, envelope.created_at);
            changes.extend(reduction.change);
            (reduction.snapshot, changes)
        })
}

// Newest open tool item, preferring an exact call id match.
fn open_tool_item<'a>(blocks: &'a mut [Block], call_id: Option<&str>) -> Option<&'a mut ResearchItem> {
    let mut newest = None;
    let mut matched = None;

    for (block_index, block) in blocks.iter().enumerate().rev() {
        let Block::Research { items } = block else {
            continue;
        };
        for (item_index, item) in items.iter().enumerate().rev() {
            let ResearchItem::Tool {
                result: None,
                call_id: item_call_id,
                ..
            } = item
            else {
                continue;
            };
            if newest.is_none() {
                newest = Some((block_index, item_index));
            }
            if matched.is_none() && call_id.is_some() && item_call_id.as_deref() == call_id {
                matched = Some((block_index, item_index));
            }
        }
    }

    let (block_index, item_index) = matched.or(newest)?;
    match blocks.get_mut(block_index) {
        Some(Block::Research { items }) => items.get_mut(item_index),
        _ => None,
    }
}

/// Strings pass through; everything else is serialized with sorted keys.
pub fn stable_json_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => canonical(other).to_string(),
    }
}

fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key.as_str()]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}
