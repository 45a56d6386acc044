//! `DecoderBackend` trait: the seam between the orchestration core and the
//! external neural decoder library. Two implementations live here and in
//! [`crate::llama_backend`]: [`ScriptedBackend`], which replays a fixed
//! token script so the lifecycle manager and orchestrator are testable
//! without a loaded model, and (feature `llama-cpp`) `LlamaBackend`, backed
//! by a real decoder library.
//!
//! The trait is split into fine-grained `attach_*` steps rather than one
//! opaque `compose_chain(params)` call so that the chain-composition order
//! lives once, generically, in [`crate::lifecycle`] — each backend only
//! supplies the primitive that attaches one stage.

use llama_chat_types::{ChatMessage, GrammarMode, OrchestratorError};

/// Decoder-library token id. Backend-agnostic: both `ScriptedBackend` and
/// the real `llama-cpp-2` backend represent tokens as `i32`.
pub type TokenId = i32;

/// The external decoder collaborator. `Grammar` is an owned,
/// independently-freed compiled constraint; `ChainBuilder` accumulates
/// sampler stages in composition order; `Chain` is the finished, sampling
/// chain attached to a generation turn.
///
/// Ownership rule: the canonical `Grammar` instance produced by
/// [`crate::lifecycle::GrammarLifecycleManager`] is never passed to
/// `attach_grammar` directly — only a value returned by `clone_grammar` is.
/// Each backend's `Grammar`/`Chain` associated types must free themselves on
/// `Drop`, since the underlying decoder library does not reference-count
/// grammar handles.
pub trait DecoderBackend {
    type Grammar;
    type ChainBuilder;
    type Chain;

    /// Tokenize a prompt. Failure surfaces as `OrchestratorError::TokenizeFailed`.
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, OrchestratorError>;

    /// Prefill: decode a full token sequence, extending the KV cache.
    fn decode(&mut self, tokens: &[TokenId]) -> Result<(), OrchestratorError>;

    /// Drop all KV-cache state, so the next `decode` starts from position 0.
    fn clear_kv_cache(&mut self);

    /// Compile a GBNF grammar in the given mode. Lazy mode activates on the
    /// trigger pattern (the literal `"{"`). Always recoverable: callers
    /// demote failures to warnings rather than aborting.
    fn compile_grammar(
        &self,
        gbnf: &str,
        mode: GrammarMode,
        trigger: &str,
    ) -> Result<Self::Grammar, llama_chat_types::GrammarError>;

    /// Produce an independently-owned clone of a compiled grammar, realized
    /// by recompiling the same source text (see DESIGN.md for why: the
    /// decoder library's native clone entry point isn't available to
    /// confirm).
    fn clone_grammar(
        &self,
        gbnf: &str,
        mode: GrammarMode,
        trigger: &str,
    ) -> Result<Self::Grammar, llama_chat_types::GrammarError> {
        self.compile_grammar(gbnf, mode, trigger)
    }

    fn new_chain_builder(&self) -> Self::ChainBuilder;
    /// Attach a grammar clone as the first stage. The chain takes ownership;
    /// it is freed exactly once, when the finished chain is dropped.
    fn attach_grammar(&self, builder: &mut Self::ChainBuilder, grammar: Self::Grammar);
    fn attach_mirostat(&self, builder: &mut Self::ChainBuilder, tau: f32, eta: f32, seed: u32);
    fn attach_temperature(&self, builder: &mut Self::ChainBuilder, temperature: f32);
    fn attach_top_k(&self, builder: &mut Self::ChainBuilder, top_k: i32);
    fn attach_top_p(&self, builder: &mut Self::ChainBuilder, top_p: f32);
    fn attach_min_p(&self, builder: &mut Self::ChainBuilder, min_p: f32);
    fn attach_dist(&self, builder: &mut Self::ChainBuilder, seed: u32);
    fn attach_greedy(&self, builder: &mut Self::ChainBuilder);
    fn finish_chain(&self, builder: Self::ChainBuilder) -> Self::Chain;

    /// Sample the next token from the chain's current logits and tell the
    /// chain to accept it (advancing any stateful stage, e.g. the grammar).
    fn sample_and_accept(&mut self, chain: &mut Self::Chain) -> TokenId;

    /// Render a token id as its UTF-8 piece (possibly a partial code point;
    /// the caller re-frames).
    fn token_to_piece(&mut self, token: TokenId) -> Vec<u8>;

    fn is_end_of_generation(&self, token: TokenId) -> bool;

    /// Apply the decoder's chat template to a message list, producing the
    /// prompt text to tokenize and prefill.
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> String;
}

/// Test/demo backend that replays a fixed script of decoder-output chunks
/// instead of running a real model, so the lifecycle manager and
/// orchestrator are testable without a loaded model. Also used by the
/// CLI's built-in demo conversation when no `--model` path is given.
///
/// `tokenize`/`decode` are no-ops: the script already encodes the full
/// turn's output as UTF-8 chunks, keyed by call index, so there is nothing
/// for this backend to "compute" from a prompt.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    /// One entry per `decode` call (i.e. per orchestrator round): the raw
    /// bytes this backend will emit, one `token_to_piece` call per queued
    /// chunk.
    script: Vec<Vec<Vec<u8>>>,
    round: usize,
    cursor: usize,
    /// Records attach_* call order for tests asserting composition order.
    pub trace: std::cell::RefCell<Vec<String>>,
    /// Shared across every `ScriptedGrammar` this backend compiles, so
    /// tests can assert exactly-once-free across clone/drop cycles.
    drop_count: std::rc::Rc<std::cell::Cell<usize>>,
    /// Message-list length seen by each `apply_chat_template` call, one
    /// entry per round, so tests can assert that the message list grows by
    /// exactly two entries per executed tool call without the orchestrator
    /// needing to expose its private history. `Rc`-shared, like
    /// `drop_count`, so a handle survives moving the backend into a
    /// `ProcessState`.
    message_counts: std::rc::Rc<std::cell::RefCell<Vec<usize>>>,
}

impl ScriptedBackend {
    /// Build a backend that emits `rounds[i]` (a sequence of UTF-8 chunks)
    /// on the `i`-th `decode` call.
    #[must_use]
    pub fn new(rounds: Vec<Vec<&str>>) -> Self {
        Self {
            script: rounds
                .into_iter()
                .map(|round| round.into_iter().map(|s| s.as_bytes().to_vec()).collect())
                .collect(),
            round: 0,
            cursor: 0,
            trace: std::cell::RefCell::new(Vec::new()),
            drop_count: std::rc::Rc::new(std::cell::Cell::new(0)),
            message_counts: std::rc::Rc::new(std::cell::RefCell::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn grammar_drop_count(&self) -> usize {
        self.drop_count.get()
    }

    /// An `Rc` handle to the per-round message-list lengths recorded by
    /// `apply_chat_template`, obtainable before the backend is moved into a
    /// `ProcessState`.
    #[must_use]
    pub fn message_counts_handle(&self) -> std::rc::Rc<std::cell::RefCell<Vec<usize>>> {
        self.message_counts.clone()
    }
}

/// A grammar handle that exists only to prove the free-exactly-once
/// invariant in tests.
#[derive(Debug)]
pub struct ScriptedGrammar {
    drops: std::rc::Rc<std::cell::Cell<usize>>,
}

impl Drop for ScriptedGrammar {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[derive(Debug, Default)]
pub struct ScriptedChainBuilder {
    grammar: Option<ScriptedGrammar>,
    stages: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedChain {
    _grammar: Option<ScriptedGrammar>,
    stages: Vec<String>,
}

impl DecoderBackend for ScriptedBackend {
    type Grammar = ScriptedGrammar;
    type ChainBuilder = ScriptedChainBuilder;
    type Chain = ScriptedChain;

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, OrchestratorError> {
        Ok((0..text.len() as i32).collect())
    }

    fn decode(&mut self, _tokens: &[TokenId]) -> Result<(), OrchestratorError> {
        self.cursor = 0;
        Ok(())
    }

    fn clear_kv_cache(&mut self) {
        self.round += 1;
    }

    fn compile_grammar(
        &self,
        gbnf: &str,
        _mode: GrammarMode,
        _trigger: &str,
    ) -> Result<Self::Grammar, llama_chat_types::GrammarError> {
        if gbnf.is_empty() {
            return Err(llama_chat_types::GrammarError::TypedSynthesisEmpty);
        }
        Ok(ScriptedGrammar {
            drops: self.drop_count.clone(),
        })
    }

    fn new_chain_builder(&self) -> Self::ChainBuilder {
        ScriptedChainBuilder::default()
    }

    fn attach_grammar(&self, builder: &mut Self::ChainBuilder, grammar: Self::Grammar) {
        self.trace.borrow_mut().push("grammar".to_string());
        builder.grammar = Some(grammar);
    }

    fn attach_mirostat(&self, builder: &mut Self::ChainBuilder, _tau: f32, _eta: f32, _seed: u32) {
        self.trace.borrow_mut().push("mirostat".to_string());
        builder.stages.push("mirostat".to_string());
    }

    fn attach_temperature(&self, builder: &mut Self::ChainBuilder, _temperature: f32) {
        self.trace.borrow_mut().push("temperature".to_string());
        builder.stages.push("temperature".to_string());
    }

    fn attach_top_k(&self, builder: &mut Self::ChainBuilder, _top_k: i32) {
        self.trace.borrow_mut().push("top_k".to_string());
        builder.stages.push("top_k".to_string());
    }

    fn attach_top_p(&self, builder: &mut Self::ChainBuilder, _top_p: f32) {
        self.trace.borrow_mut().push("top_p".to_string());
        builder.stages.push("top_p".to_string());
    }

    fn attach_min_p(&self, builder: &mut Self::ChainBuilder, _min_p: f32) {
        self.trace.borrow_mut().push("min_p".to_string());
        builder.stages.push("min_p".to_string());
    }

    fn attach_dist(&self, builder: &mut Self::ChainBuilder, _seed: u32) {
        self.trace.borrow_mut().push("dist".to_string());
        builder.stages.push("dist".to_string());
    }

    fn attach_greedy(&self, builder: &mut Self::ChainBuilder) {
        self.trace.borrow_mut().push("greedy".to_string());
        builder.stages.push("greedy".to_string());
    }

    fn finish_chain(&self, builder: Self::ChainBuilder) -> Self::Chain {
        ScriptedChain {
            _grammar: builder.grammar,
            stages: builder.stages,
        }
    }

    fn sample_and_accept(&mut self, _chain: &mut Self::Chain) -> TokenId {
        self.cursor as i32
    }

    fn token_to_piece(&mut self, _token: TokenId) -> Vec<u8> {
        let round = self.script.get(self.round).cloned().unwrap_or_default();
        let chunk = round.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        chunk
    }

    fn is_end_of_generation(&self, _token: TokenId) -> bool {
        self.script
            .get(self.round)
            .map_or(true, |r| self.cursor > r.len())
    }

    fn apply_chat_template(&self, messages: &[ChatMessage]) -> String {
        self.message_counts.borrow_mut().push(messages.len());
        messages
            .iter()
            .map(|m| format!("<{:?}>{}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
