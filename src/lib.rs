//! Reference CLI library for the tool-calling orchestration core: wires
//! together `llama-chat-tools`, `llama-chat-engine`, and `llama-chat-worker`,
//! and re-exports the public surface a consumer or the `llama-chat-cli`
//! binary needs.

mod demo;

pub use demo::{demo_backend, DEMO_CATALOG_JSON};

pub use llama_chat_command::ShellCommandExecutor;
pub use llama_chat_config::{ChatTemplateFamily, OrchestratorConfig};
pub use llama_chat_engine::{DecoderBackend, GrammarLifecycleManager, ProcessState, ScriptedBackend};
#[cfg(feature = "llama-cpp")]
pub use llama_chat_engine::LlamaBackend;
pub use llama_chat_tools::{parse_tool_catalog, synthesize_typed_grammar, validate_catalog};
pub use llama_chat_types::{
    CatalogError, ChatMessage, GrammarError, GrammarMode, OrchestratorError, ParamDescriptor, ParamType, ParsedTool,
    Role, SamplerParams, ToolCall, ToolExecutor, ToolResult,
};
pub use llama_chat_worker::{generate_with_tools, DetectedCall, Sinks, ToolCallDetector};
