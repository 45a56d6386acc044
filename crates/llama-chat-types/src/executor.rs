//! Tool execution contract, supplied by the caller.

use serde_json::Value;

/// A detected tool call: the name and (already-canonicalised) JSON
/// arguments payload, plus the raw tool-call JSON text as emitted by the
/// detector, used verbatim when appending the assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub raw: String,
}

/// Result of executing a [`ToolCall`]. `is_error` distinguishes executor
/// failures (recorded as an error tool message, loop continues) from
/// successful results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_name: String,
    pub result_payload: String,
    pub is_error: bool,
}

impl ToolResult {
    #[must_use]
    pub fn ok(tool_name: impl Into<String>, result_payload: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            result_payload: result_payload.into(),
            is_error: false,
        }
    }

    #[must_use]
    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            result_payload: message.into(),
            is_error: true,
        }
    }
}

/// Caller-supplied executor. `execute` may suspend and may panic-free
/// surface a failure through `ToolResult::error` rather than raising; the
/// orchestrator never expects this trait to unwind.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, call: &ToolCall) -> ToolResult;
}
