//! Outline - read-only forest view of a conversation tree
//!
//! Used by navigation UIs to list every branch with a short preview. The
//! outline is derived from a snapshot and never mutates it.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::message::{Block, Message, MessageId, Role};
use crate::tree::{find_message, sibling_ids};

/// Number of characters kept from a content block.
pub const PREVIEW_CHARS: usize = 60;
pub const EMPTY_PREVIEW: &str = "空消息";
pub const RESEARCH_PREVIEW: &str = "思考/工具调用";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineNode {
    pub message_id: MessageId,
    pub role: Role,
    pub preview: String,
    /// 1-based position among the node's siblings
    pub sibling_index: usize,
    pub sibling_count: usize,
    pub children: Vec<OutlineNode>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineTree {
    pub roots: Vec<OutlineNode>,
    /// Parent of every indexed message; roots map to `None`.
    pub parent_by_id: HashMap<MessageId, Option<MessageId>>,
}

/// Builds the outline forest.
///
/// Roots in the chain of `latest_root_id` come first in sibling order, then
/// every other root-level message in array order. Sibling positions and
/// counts are relative to a root's own sibling chain, so an unlinked root
/// counts as 1 of 1. Messages reachable twice through corrupted links are
/// indexed once.
pub fn build_outline_tree(messages: &[Message], latest_root_id: Option<MessageId>) -> OutlineTree {
    let mut has_parent = HashSet::new();
    for message in messages {
        if let Some(child) = message.latest_child {
            has_parent.extend(sibling_ids(messages, child));
        }
    }

    let mut roots = Vec::new();
    if let Some(id) = latest_root_id {
        push_chain(&mut roots, &sibling_ids(messages, id));
    }
    for message in messages {
        if !has_parent.contains(&message.id) && !roots.iter().any(|(id, _, _)| *id == message.id) {
            push_chain(&mut roots, &sibling_ids(messages, message.id));
        }
    }

    let mut outline = OutlineTree::default();
    let mut visited = HashSet::new();

    for (root_id, sibling_index, sibling_count) in roots {
        if !visited.insert(root_id) {
            continue;
        }
        outline.parent_by_id.insert(root_id, None);
        if let Some(node) = expand(
            messages,
            root_id,
            sibling_index,
            sibling_count,
            &mut visited,
            &mut outline.parent_by_id,
        ) {
            outline.roots.push(node);
        }
    }

    outline
}

// Root-level chains are numbered independently: (id, position, chain length).
fn push_chain(roots: &mut Vec<(MessageId, usize, usize)>, chain: &[MessageId]) {
    for (index, id) in chain.iter().enumerate() {
        if !roots.iter().any(|(root, _, _)| root == id) {
            roots.push((*id, index + 1, chain.len()));
        }
    }
}

struct Frame<'a> {
    message: &'a Message,
    sibling_index: usize,
    sibling_count: usize,
    pending: VecDeque<(usize, MessageId)>,
    child_count: usize,
    children: Vec<OutlineNode>,
}

impl<'a> Frame<'a> {
    fn open(
        messages: &'a [Message],
        id: MessageId,
        sibling_index: usize,
        sibling_count: usize,
        visited: &mut HashSet<MessageId>,
        parent_by_id: &mut HashMap<MessageId, Option<MessageId>>,
    ) -> Option<Self> {
        let message = find_message(messages, id)?;
        let generation = message
            .latest_child
            .map(|child| sibling_ids(messages, child))
            .unwrap_or_default();

        let mut pending = VecDeque::new();
        for (index, child_id) in generation.iter().enumerate() {
            if visited.insert(*child_id) {
                parent_by_id.insert(*child_id, Some(id));
                pending.push_back((index + 1, *child_id));
            }
        }

        Some(Self {
            message,
            sibling_index,
            sibling_count,
            pending,
            child_count: generation.len(),
            children: Vec::new(),
        })
    }

    fn into_node(self) -> OutlineNode {
        OutlineNode {
            message_id: self.message.id,
            role: self.message.role,
            preview: get_preview(self.message),
            sibling_index: self.sibling_index,
            sibling_count: self.sibling_count,
            children: self.children,
        }
    }
}

// Explicit stack: conversations can be thousands of messages deep.
fn expand(
    messages: &[Message],
    root_id: MessageId,
    sibling_index: usize,
    sibling_count: usize,
    visited: &mut HashSet<MessageId>,
    parent_by_id: &mut HashMap<MessageId, Option<MessageId>>,
) -> Option<OutlineNode> {
    let mut stack = vec![Frame::open(
        messages,
        root_id,
        sibling_index,
        sibling_count,
        visited,
        parent_by_id,
    )?];
    let mut finished = None;

    while let Some(mut frame) = stack.pop() {
        if let Some((index, child_id)) = frame.pending.pop_front() {
            let count = frame.child_count;
            stack.push(frame);
            if let Some(child) =
                Frame::open(messages, child_id, index, count, visited, parent_by_id)
            {
                stack.push(child);
            }
            continue;
        }

        let node = frame.into_node();
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => finished = Some(node),
        }
    }

    finished
}

/// Root-to-target chain of ids, or empty when `target_id` is not indexed.
pub fn find_path_to_message(
    parent_by_id: &HashMap<MessageId, Option<MessageId>>,
    target_id: MessageId,
) -> Vec<MessageId> {
    if !parent_by_id.contains_key(&target_id) {
        return Vec::new();
    }

    let mut path = vec![target_id];
    let mut cursor = parent_by_id.get(&target_id).copied().flatten();
    while let Some(id) = cursor {
        if path.contains(&id) || path.len() > parent_by_id.len() {
            break;
        }
        path.push(id);
        cursor = parent_by_id.get(&id).copied().flatten();
    }
    path.reverse();
    path
}

/// One-line summary of a message, decided by its last meaningful block.
pub fn get_preview(message: &Message) -> String {
    message
        .blocks
        .iter()
        .rev()
        .find_map(block_preview)
        .unwrap_or_else(|| EMPTY_PREVIEW.to_string())
}

fn block_preview(block: &Block) -> Option<String> {
    match block {
        Block::Content { text } => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.chars().take(PREVIEW_CHARS).collect())
        }
        Block::Attachments { attachments } => {
            (!attachments.is_empty()).then(|| format!("图片 x{}", attachments.len()))
        }
        Block::Research { items } => (!items.is_empty()).then(|| RESEARCH_PREVIEW.to_string()),
        Block::Error { message } => Some(format!("错误: {message}")),
    }
}
