//! Tree path to provider messages
//!
//! Only the active path is sent. Thinking and error blocks stay local; tool
//! items with a result are replayed as an assistant `tool_calls` message
//! followed by one `tool` message per call.

use chat_core::{Block, Message as TreeMessage, ResearchItem, Role as TreeRole, TreeError, TreeSnapshot};

use crate::agent::types::Message;
use crate::tools::ToolCall;

pub fn convert_path_to_messages(
    snapshot: &TreeSnapshot,
    system_prompt: Option<&str>,
) -> Result<Vec<Message>, TreeError> {
    let mut messages = Vec::new();
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        messages.push(Message::system(prompt));
    }

    for message in snapshot.path_messages()? {
        match message.role {
            TreeRole::User => messages.push(Message::user(user_text(&message))),
            TreeRole::Assistant => push_assistant(&mut messages, &message),
        }
    }

    Ok(messages)
}

fn user_text(message: &TreeMessage) -> String {
    let mut parts = Vec::new();
    for block in &message.blocks {
        match block {
            Block::Content { text } => parts.push(text.clone()),
            Block::Attachments { attachments } => {
                for attachment in attachments {
                    let name = attachment.name.as_deref().unwrap_or(&attachment.id);
                    parts.push(format!("[attachment: {} ({})]", name, attachment.mime_type));
                }
            }
            Block::Research { .. } | Block::Error { .. } => {}
        }
    }
    parts.join("\n")
}

fn push_assistant(messages: &mut Vec<Message>, message: &TreeMessage) {
    let mut content = String::new();
    let mut call_index = 0usize;

    for block in &message.blocks {
        match block {
            Block::Content { text } => content.push_str(text),
            Block::Research { items } => {
                let mut calls = Vec::new();
                let mut results = Vec::new();
                for item in items {
                    let ResearchItem::Tool {
                        call,
                        result: Some(result),
                        call_id,
                        ..
                    } = item
                    else {
                        continue;
                    };
                    call_index += 1;
                    let id = call_id
                        .clone()
                        .unwrap_or_else(|| format!("call_{}_{}", message.id, call_index));
                    calls.push(ToolCall::new(id.clone(), call.name.clone(), call.args.to_string()));
                    results.push(Message::tool_result(id, result.clone()));
                }

                if !calls.is_empty() {
                    messages.push(Message::assistant(std::mem::take(&mut content), Some(calls)));
                    messages.extend(results);
                }
            }
            Block::Attachments { .. } | Block::Error { .. } => {}
        }
    }

    if !content.is_empty() {
        messages.push(Message::assistant(content, None));
    }
}
