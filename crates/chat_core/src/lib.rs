//! chat_core - Conversation tree types shared by the chat crates
//!
//! - `message` - Message, Role and the typed Block union
//! - `tree` - TreeSnapshot and the branching operations on it
//! - `outline` - read-only forest projection for navigation
//! - `config` / `paths` - runtime configuration

pub mod config;
pub mod message;
pub mod outline;
pub mod paths;
pub mod tree;

pub use config::{Config, DEFAULT_MODEL, MAX_ITERATIONS};
pub use message::{
    clone_blocks, clone_messages, Attachment, Block, Message, MessageId, ResearchItem, Role,
    ToolInvocation, ToolProgress,
};
pub use outline::{build_outline_tree, find_path_to_message, get_preview, OutlineNode, OutlineTree};
pub use tree::{
    build_current_path, compute_messages_from_path, create_linear_messages, sibling_ids,
    validate_blocks, MessageInput, TreeError, TreeSnapshot,
};
