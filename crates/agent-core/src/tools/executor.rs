use async_trait::async_trait;
use chat_core::ToolProgress;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::tools::{ToolCall, ToolResult, ToolSchema};

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Channel a running tool reports progress on.
pub type ToolProgressSender = mpsc::Sender<ToolProgress>;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Runs one call. Progress sent on `progress` is forwarded to the client
    /// while the call is still running.
    async fn execute(&self, call: &ToolCall, progress: ToolProgressSender) -> Result<ToolResult>;
    fn list_tools(&self) -> Vec<ToolSchema>;
}

/// Executor with no tools; every call fails with `NotFound`.
#[derive(Debug, Default, Clone)]
pub struct NoopToolExecutor;

#[async_trait]
impl ToolExecutor for NoopToolExecutor {
    async fn execute(&self, call: &ToolCall, _progress: ToolProgressSender) -> Result<ToolResult> {
        Err(ToolError::NotFound(call.function.name.clone()))
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        Vec::new()
    }
}

/// Runs a call and folds failures into the result text, which is what the
/// model sees for a failed tool.
pub async fn execute_tool_call(
    tool_call: &ToolCall,
    tools: &dyn ToolExecutor,
    progress: ToolProgressSender,
) -> ToolResult {
    match tools.execute(tool_call, progress).await {
        Ok(result) => result,
        Err(error) => {
            log::warn!("Tool {} failed: {}", tool_call.function.name, error);
            ToolResult::failed(format!("Error: {error}"))
        }
    }
}

/// Parses streamed argument text; blank means no arguments.
pub fn parse_tool_args(arguments: &str) -> Result<serde_json::Value> {
    let args_raw = arguments.trim();

    if args_raw.is_empty() {
        return Ok(serde_json::json!({}));
    }

    serde_json::from_str(args_raw)
        .map_err(|error| ToolError::InvalidArguments(format!("Invalid JSON arguments: {error}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct StaticExecutor {
        results: HashMap<String, ToolResult>,
    }

    #[async_trait]
    impl ToolExecutor for StaticExecutor {
        async fn execute(&self, call: &ToolCall, progress: ToolProgressSender) -> Result<ToolResult> {
            let _ = progress
                .send(ToolProgress {
                    stage: "run".to_string(),
                    message: call.function.name.clone(),
                    received_bytes: None,
                    total_bytes: None,
                })
                .await;
            self.results
                .get(&call.function.name)
                .cloned()
                .ok_or_else(|| ToolError::NotFound(call.function.name.clone()))
        }

        fn list_tools(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn execute_tool_call_reports_progress_and_result() {
        let mut results = HashMap::new();
        results.insert("echo".to_string(), ToolResult::ok("hi"));
        let tools = StaticExecutor { results };
        let (tx, mut rx) = mpsc::channel(4);

        let result = execute_tool_call(&ToolCall::new("call_1", "echo", "{}"), &tools, tx).await;

        assert_eq!(result, ToolResult::ok("hi"));
        assert_eq!(rx.recv().await.unwrap().message, "echo");
    }

    #[tokio::test]
    async fn tool_errors_become_result_text() {
        let (tx, _rx) = mpsc::channel(1);
        let result =
            execute_tool_call(&ToolCall::new("call_1", "missing", "{}"), &NoopToolExecutor, tx).await;

        assert!(!result.success);
        assert_eq!(result.result, "Error: Tool not found: missing");
    }

    #[test]
    fn parse_tool_args_handles_blank_and_invalid_input() {
        assert_eq!(parse_tool_args("  ").unwrap(), serde_json::json!({}));
        assert_eq!(parse_tool_args(r#"{"a":1}"#).unwrap()["a"], 1);
        assert!(matches!(
            parse_tool_args("{oops"),
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
