use thiserror::Error;

use crate::storage::StorageError;
use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid conversation: {0}")]
    Tree(#[from] chat_core::TreeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] chat_state::ProtocolError),

    #[error("Cancelled")]
    Cancelled,
}
