pub mod agent;
pub mod storage;
pub mod tools;

pub use agent::{convert_path_to_messages, derive_title, AgentError, Conversation, Message, Role};
pub use storage::{
    ConversationPage, JsonlStorage, ListQuery, MemoryStorage, Storage, StorageError,
};
pub use tools::{
    execute_tool_call, parse_tool_args, FunctionCall, FunctionSchema, NoopToolExecutor, ToolCall,
    ToolCallAccumulator, ToolError, ToolExecutor, ToolProgressSender, ToolResult, ToolSchema,
};
