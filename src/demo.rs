//! Built-in demo conversation: a fixed tool catalog and a [`ScriptedBackend`]
//! script, so the CLI binary is runnable end-to-end without a GGUF model on
//! disk.

use llama_chat_engine::ScriptedBackend;

/// Tool catalog for the demo conversation: `echo` (one required string
/// parameter) and `get_time` (no parameters), matching the two tools
/// [`llama_chat_command::ShellCommandExecutor`] knows how to dispatch.
pub const DEMO_CATALOG_JSON: &str = r#"[
  {"type":"function","function":{"name":"echo","description":"Echo a string back","parameters":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}}},
  {"type":"function","function":{"name":"get_time","description":"Get the current Unix time","parameters":{"type":"object","properties":{},"required":[]}}}
]"#;

const DEMO_CALL: &str = r#"{"tool_calls":[{"name":"echo","arguments":{"text":"hello from the demo catalog"}}]}"#;
const DEMO_REPLY: &str = "Done — the tool echoed the text back.";

/// A two-round scripted backend: round 0 emits an `echo` tool call, round 1
/// replies in plain text once the tool result is appended to the history.
#[must_use]
pub fn demo_backend() -> ScriptedBackend {
    ScriptedBackend::new(vec![vec![DEMO_CALL], vec![DEMO_REPLY]])
}
