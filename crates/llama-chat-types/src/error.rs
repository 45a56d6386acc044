//! Error taxonomy for the tool-calling orchestration core.
//!
//! Three library-level error enums, one per failure domain: catalog errors
//! are reported synchronously at `enable` time, grammar-build errors are
//! always recoverable (generation proceeds unconstrained), and orchestrator
//! errors are the ones surfaced through `on_error`.

use thiserror::Error;

/// Catalog parsing/validation failures, reported synchronously when a tool
/// catalog is enabled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("tool catalog is empty")]
    Empty,
    #[error("tool catalog payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("every tool entry in the catalog failed to parse")]
    AllEntriesFailed,
}

/// Grammar-build failures. These are always demoted to warnings by the
/// caller: generation proceeds with no constraint rather than aborting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("typed grammar synthesis produced an empty grammar")]
    TypedSynthesisEmpty,
    #[error("grammar compilation failed in strict mode: {0}")]
    StrictCompileFailed(String),
    #[error("grammar compilation failed in lazy mode: {0}")]
    LazyCompileFailed(String),
    #[error("no grammar could be compiled in either mode")]
    AllAttemptsFailed,
}

/// Errors surfaced to the caller's `on_error` sink. Cancellation is
/// deliberately not a variant here: it terminates via
/// `on_done(accumulated_text)`, not `on_error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("tokenization failed: {0}")]
    TokenizeFailed(String),
    #[error("context overflow: {0}")]
    ContextOverflow(String),
    #[error("decode step failed: {0}")]
    DecodeFailed(String),
    #[error("tool call parse failure: {0}")]
    ToolCallParseFailure(String),
    #[error("max rounds exceeded: {0}")]
    MaxRoundsExceeded(usize),
}
