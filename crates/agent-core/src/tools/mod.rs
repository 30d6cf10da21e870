pub mod accumulator;
pub mod executor;
pub mod types;

pub use accumulator::ToolCallAccumulator;
pub use executor::{
    execute_tool_call, parse_tool_args, NoopToolExecutor, ToolError, ToolExecutor,
    ToolProgressSender,
};
pub use types::{FunctionCall, FunctionSchema, ToolCall, ToolResult, ToolSchema};
