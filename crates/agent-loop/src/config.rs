use agent_core::tools::ToolSchema;
use chat_core::{Config, DEFAULT_MODEL, MAX_ITERATIONS};

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Provider turns allowed before the loop gives up with an error event.
    pub max_iterations: u32,
    /// Model id passed to the provider and reported in the cap error.
    pub model: String,
    pub system_prompt: Option<String>,
    /// Schemas offered on top of the executor's own `list_tools()`.
    pub additional_tool_schemas: Vec<ToolSchema>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            additional_tool_schemas: Vec::new(),
        }
    }
}

impl AgentLoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            additional_tool_schemas: Vec::new(),
        }
    }
}
