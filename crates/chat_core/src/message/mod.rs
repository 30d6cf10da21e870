mod content;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use content::{
    clone_blocks, Attachment, Block, ResearchItem, ToolInvocation, ToolProgress,
};

/// Message ids are 1-based and dense within one conversation.
pub type MessageId = u32;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One node of the conversation tree.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sibling: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sibling: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_child: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, role: Role, blocks: Vec<Block>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            blocks,
            prev_sibling: None,
            next_sibling: None,
            latest_child: None,
            created_at,
        }
    }

    /// All content text concatenated.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(Block::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Deep copy of a message list.
pub fn clone_messages(messages: &[Message]) -> Vec<Message> {
    messages.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_do_not_share_state_with_the_originals() {
        let original = vec![Message::new(1, Role::Assistant, vec![Block::content("draft")], Utc::now())];

        let mut messages = clone_messages(&original);
        messages[0].blocks.push(Block::error("changed"));
        messages[0].latest_child = Some(2);

        let mut blocks = clone_blocks(&original[0].blocks);
        blocks[0] = Block::content("rewritten");

        assert_eq!(original[0].blocks, vec![Block::content("draft")]);
        assert_eq!(original[0].latest_child, None);
        assert_eq!(messages[0].blocks[0], Block::content("draft"));
    }
}
