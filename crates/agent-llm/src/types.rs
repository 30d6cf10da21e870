use agent_core::tools::ToolCall;

/// One item of a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LLMChunk {
    /// Assistant text delta
    Token(String),
    /// Reasoning delta
    Thinking(String),
    /// Tool call fragments; complete calls are assembled by the consumer.
    ToolCalls(Vec<ToolCall>),
    /// End of the turn
    Done,
}
