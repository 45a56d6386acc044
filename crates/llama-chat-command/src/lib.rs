//! Reference [`ToolExecutor`] implementation used by the demo CLI and by
//! integration tests.
//!
//! Dispatches by tool name against a small fixed allowlist of demo tools;
//! unrestricted shell execution is deliberately out of scope for a demo
//! executor.

use std::time::{SystemTime, UNIX_EPOCH};

use llama_chat_types::{ToolCall, ToolExecutor, ToolResult};

/// Dispatches to a small fixed allowlist of demo tools: `echo` and
/// `get_time`. Any other tool name yields an error [`ToolResult`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellCommandExecutor;

impl ShellCommandExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn tool_echo(call: &ToolCall) -> ToolResult {
    let text = call
        .arguments
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    ToolResult::ok(&call.name, text)
}

fn tool_get_time(call: &ToolCall) -> ToolResult {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => ToolResult::ok(&call.name, format!("{{\"unix_epoch_seconds\":{}}}", d.as_secs())),
        Err(e) => ToolResult::error(&call.name, format!("system clock error: {e}")),
    }
}

impl ToolExecutor for ShellCommandExecutor {
    fn execute(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            "echo" => tool_echo(call),
            "get_time" => tool_get_time(call),
            other => ToolResult::error(&call.name, format!("unknown tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments,
            raw: String::new(),
        }
    }

    #[test]
    fn echo_returns_input_text() {
        let executor = ShellCommandExecutor::new();
        let result = executor.execute(&call("echo", json!({"text": "hello"})));
        assert!(!result.is_error);
        assert_eq!(result.result_payload, "hello");
    }

    #[test]
    fn get_time_returns_epoch_seconds() {
        let executor = ShellCommandExecutor::new();
        let result = executor.execute(&call("get_time", json!({})));
        assert!(!result.is_error);
        assert!(result.result_payload.contains("unix_epoch_seconds"));
    }

    #[test]
    fn unknown_tool_is_an_error_result() {
        let executor = ShellCommandExecutor::new();
        let result = executor.execute(&call("delete_everything", json!({})));
        assert!(result.is_error);
    }
}
