//! MessageTree - branching conversation history
//!
//! Messages live in a dense, append-only vector indexed by `id - 1`. Children
//! of one parent form a doubly-linked sibling chain; the parent's
//! `latest_child` names the active sibling. `current_path` is the root-to-leaf
//! chain that is displayed and sent to the provider.
//!
//! Every operation takes a snapshot and hands back a new one. Infallible
//! operations consume the snapshot, fallible ones borrow it and leave it
//! untouched on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Block, Message, MessageId, Role};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Depth {depth} is outside the current path (length {path_len})")]
    InvalidDepth { depth: usize, path_len: usize },

    #[error("Message {node_id} is not a sibling of the message at depth {depth}")]
    NotASibling { node_id: MessageId, depth: usize },

    #[error("Unknown message id: {0}")]
    UnknownMessage(MessageId),

    #[error("Message {id} is not a child of message {parent}")]
    BrokenPath { parent: MessageId, id: MessageId },

    #[error("Message {id} has id out of sequence (expected {expected})")]
    OutOfSequence { id: MessageId, expected: MessageId },

    #[error("A {role:?} message cannot carry a {kind} block")]
    BlockNotAllowed { role: Role, kind: &'static str },
}

/// Complete state of one conversation tree.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_path: Vec<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_root_id: Option<MessageId>,
    #[serde(default = "first_id")]
    pub next_id: MessageId,
}

fn first_id() -> MessageId {
    1
}

impl Default for TreeSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Input row for [`create_linear_messages`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    pub role: Role,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            current_path: Vec::new(),
            latest_root_id: None,
            next_id: first_id(),
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        find_message(&self.messages, id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let index = (id as usize).checked_sub(1)?;
        self.messages.get_mut(index).filter(|message| message.id == id)
    }

    /// Last message on the active path.
    pub fn last_message(&self) -> Option<&Message> {
        self.current_path.last().and_then(|id| self.get(*id))
    }

    /// Mutable access to the tail of the active path, for streaming deltas.
    pub fn last_message_mut(&mut self) -> Option<&mut Message> {
        let id = *self.current_path.last()?;
        self.get_mut(id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message below the last id of the active path.
    ///
    /// With an empty path the message becomes a new root. If the parent
    /// already has children the message joins the tail of their sibling
    /// chain and becomes the active child.
    pub fn add_message(
        mut self,
        role: Role,
        blocks: Vec<Block>,
        created_at: Option<DateTime<Utc>>,
    ) -> (Self, Message) {
        let id = self.next_id;
        let mut message = Message::new(id, role, blocks, created_at.unwrap_or_else(Utc::now));

        let parent = self.current_path.last().copied();
        let first_sibling = match parent {
            Some(parent_id) => self.get(parent_id).and_then(|m| m.latest_child),
            None => self.latest_root_id,
        };

        if let Some(first_sibling) = first_sibling {
            let tail = sibling_tail(&self.messages, first_sibling);
            if let Some(tail_message) = self.get_mut(tail) {
                tail_message.next_sibling = Some(id);
                message.prev_sibling = Some(tail);
            }
        }

        match parent {
            Some(parent_id) => {
                if let Some(parent_message) = self.get_mut(parent_id) {
                    parent_message.latest_child = Some(id);
                }
            }
            None => self.latest_root_id = Some(id),
        }

        self.messages.push(message.clone());
        self.current_path.push(id);
        self.next_id += 1;

        (self, message)
    }

    /// Makes `node_id` the active branch at 1-based `depth`.
    ///
    /// The path below the switched node is restored by following
    /// `latest_child` pointers, so the most recently visited continuation
    /// comes back. Only the direct parent's pointer changes.
    pub fn switch_branch(&self, depth: usize, node_id: MessageId) -> Result<Self, TreeError> {
        let current = self.node_at_depth(depth)?;
        if !sibling_ids(&self.messages, current).contains(&node_id) {
            return Err(TreeError::NotASibling { node_id, depth });
        }

        let mut next = self.clone();
        next.current_path.truncate(depth - 1);
        next.set_active_child(node_id);
        next.current_path.push(node_id);
        next.extend_path_from(node_id);
        Ok(next)
    }

    /// Branches off `message_id` with a new sibling carrying `new_blocks`.
    ///
    /// The original message and its descendants stay in the tree. Returns
    /// `None` when `message_id` is not at `depth` on the active path. Callers
    /// only edit user messages.
    pub fn edit_message(
        &self,
        depth: usize,
        message_id: MessageId,
        new_blocks: Vec<Block>,
    ) -> Option<(Self, Message)> {
        let role = self.message_at_depth(depth, message_id)?.role;
        let mut next = self.clone();
        next.current_path.truncate(depth - 1);
        Some(next.add_message(role, new_blocks, None))
    }

    /// Opens an empty assistant sibling of `message_id` for a regenerated reply.
    pub fn regenerate_message(
        &self,
        depth: usize,
        message_id: MessageId,
    ) -> Option<(Self, Message)> {
        let message = self.message_at_depth(depth, message_id)?;
        if message.role != Role::Assistant {
            return None;
        }
        let mut next = self.clone();
        next.current_path.truncate(depth - 1);
        Some(next.add_message(Role::Assistant, Vec::new(), None))
    }

    /// Messages along the active path.
    pub fn path_messages(&self) -> Result<Vec<Message>, TreeError> {
        compute_messages_from_path(&self.messages, &self.current_path)
    }

    /// Structural check for snapshots arriving from outside the process.
    pub fn validate(&self) -> Result<(), TreeError> {
        for (index, message) in self.messages.iter().enumerate() {
            let expected = index as MessageId + 1;
            if message.id != expected {
                return Err(TreeError::OutOfSequence {
                    id: message.id,
                    expected,
                });
            }
            validate_blocks(message.role, &message.blocks)?;
        }

        let expected_next = self.messages.len() as MessageId + 1;
        if self.next_id != expected_next {
            return Err(TreeError::OutOfSequence {
                id: self.next_id,
                expected: expected_next,
            });
        }

        let mut parent: Option<MessageId> = None;
        for id in &self.current_path {
            let first = match parent {
                Some(parent_id) => self
                    .get(parent_id)
                    .and_then(|m| m.latest_child)
                    .ok_or(TreeError::BrokenPath {
                        parent: parent_id,
                        id: *id,
                    })?,
                None => self.latest_root_id.ok_or(TreeError::UnknownMessage(*id))?,
            };
            if self.get(*id).is_none() {
                return Err(TreeError::UnknownMessage(*id));
            }
            if !sibling_ids(&self.messages, first).contains(id) {
                return Err(TreeError::BrokenPath {
                    parent: parent.unwrap_or(0),
                    id: *id,
                });
            }
            parent = Some(*id);
        }
        Ok(())
    }

    /// True when every message of `base` is here unchanged, so this
    /// snapshot only adds to it.
    ///
    /// Sibling and child links are not compared; they move as branches are
    /// added.
    pub fn extends(&self, base: &TreeSnapshot) -> bool {
        self.next_id >= base.next_id
            && base.messages.iter().all(|message| {
                self.get(message.id)
                    .is_some_and(|ours| ours.role == message.role && ours.blocks == message.blocks)
            })
    }

    fn node_at_depth(&self, depth: usize) -> Result<MessageId, TreeError> {
        if depth == 0 || depth > self.current_path.len() {
            return Err(TreeError::InvalidDepth {
                depth,
                path_len: self.current_path.len(),
            });
        }
        Ok(self.current_path[depth - 1])
    }

    fn message_at_depth(&self, depth: usize, message_id: MessageId) -> Option<&Message> {
        match self.node_at_depth(depth) {
            Ok(id) if id == message_id => self.get(message_id),
            _ => None,
        }
    }

    fn set_active_child(&mut self, node_id: MessageId) {
        match self.current_path.last().copied() {
            Some(parent_id) => {
                if let Some(parent) = self.get_mut(parent_id) {
                    parent.latest_child = Some(node_id);
                }
            }
            None => self.latest_root_id = Some(node_id),
        }
    }

    fn extend_path_from(&mut self, start: MessageId) {
        let mut cursor = start;
        for _ in 0..self.messages.len() {
            let Some(child) = self.get(cursor).and_then(|m| m.latest_child) else {
                break;
            };
            if self.current_path.contains(&child) {
                log::warn!("latest_child cycle at message {}", cursor);
                break;
            }
            self.current_path.push(child);
            cursor = child;
        }
    }
}

pub(crate) fn find_message(messages: &[Message], id: MessageId) -> Option<&Message> {
    let index = (id as usize).checked_sub(1)?;
    messages.get(index).filter(|message| message.id == id)
}

fn sibling_tail(messages: &[Message], start: MessageId) -> MessageId {
    let mut cursor = start;
    for _ in 0..messages.len() {
        match find_message(messages, cursor).and_then(|m| m.next_sibling) {
            Some(next) if next != start => cursor = next,
            _ => break,
        }
    }
    cursor
}

/// First sibling of the chain that contains `id`.
pub fn sibling_head(messages: &[Message], id: MessageId) -> MessageId {
    let mut cursor = id;
    for _ in 0..messages.len() {
        match find_message(messages, cursor).and_then(|m| m.prev_sibling) {
            Some(prev) if prev != id => cursor = prev,
            _ => break,
        }
    }
    cursor
}

/// Every sibling of `id` (itself included), head first.
pub fn sibling_ids(messages: &[Message], id: MessageId) -> Vec<MessageId> {
    if find_message(messages, id).is_none() {
        return Vec::new();
    }

    let mut ids = Vec::new();
    let mut cursor = Some(sibling_head(messages, id));
    while let Some(current) = cursor {
        if ids.contains(&current) || find_message(messages, current).is_none() {
            break;
        }
        ids.push(current);
        cursor = find_message(messages, current).and_then(|m| m.next_sibling);
    }
    ids
}

/// Resolves path ids to full messages, in order.
pub fn compute_messages_from_path(
    messages: &[Message],
    path: &[MessageId],
) -> Result<Vec<Message>, TreeError> {
    path.iter()
        .map(|id| {
            find_message(messages, *id)
                .cloned()
                .ok_or(TreeError::UnknownMessage(*id))
        })
        .collect()
}

/// Rebuilds the active path from the preferred root by following `latest_child`.
pub fn build_current_path(messages: &[Message], latest_root_id: Option<MessageId>) -> Vec<MessageId> {
    let mut path = Vec::new();
    let mut cursor = latest_root_id.filter(|id| find_message(messages, *id).is_some());

    while let Some(id) = cursor {
        if path.contains(&id) {
            break;
        }
        path.push(id);
        cursor = find_message(messages, id)
            .and_then(|m| m.latest_child)
            .filter(|child| find_message(messages, *child).is_some());
    }
    path
}

/// Builds a non-branching chain from flat history.
pub fn create_linear_messages(inputs: impl IntoIterator<Item = MessageInput>) -> TreeSnapshot {
    inputs
        .into_iter()
        .fold(TreeSnapshot::new(), |state, input| {
            state.add_message(input.role, input.blocks, input.created_at).0
        })
}

/// Rejects blocks a message of `role` may not carry.
pub fn validate_blocks(role: Role, blocks: &[Block]) -> Result<(), TreeError> {
    match blocks.iter().find(|block| !block.allowed_for(role)) {
        Some(block) => Err(TreeError::BlockNotAllowed {
            role,
            kind: block.kind(),
        }),
        None => Ok(()),
    }
}
