//! Shared data model for the tool-calling orchestration core: parsed tool
//! catalogs, chat messages, sampler parameters, and the executor contract.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod message;
pub mod sampler;

pub use catalog::{ParamDescriptor, ParamType, ParsedTool};
pub use error::{CatalogError, GrammarError, OrchestratorError};
pub use executor::{ToolCall, ToolExecutor, ToolResult};
pub use message::{ChatMessage, Role};
pub use sampler::{GrammarMode, SamplerParams};
