//! Real decoder backend (feature `llama-cpp`), backed by `llama-cpp-2`/
//! `llama-cpp-sys-2`.
//!
//! Model load, tokenize, batch/decode loop, sample, and `token_to_bytes`
//! follow the library's own usage pattern. KV-cache clearing is realized by
//! recreating the context rather than clearing it in place, using an unsafe
//! `'static`-transmute to store the new context alongside the model it
//! borrows from.

use std::num::NonZeroU32;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend as RawBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;

use llama_chat_config::ChatTemplateFamily;
use llama_chat_types::{ChatMessage, GrammarError, GrammarMode, OrchestratorError};

use crate::backend::{DecoderBackend, TokenId};

const GRAMMAR_ROOT_RULE: &str = "root";

/// Owns the raw backend handle, the loaded model, and the active context.
/// `context` borrows from `model`, which in turn must outlive `backend`;
/// Rust can't express that self-referential relationship directly, so the
/// context's lifetime is erased to `'static` and the drop order is
/// maintained by field declaration order (fields drop top-to-bottom).
pub struct LlamaBackend {
    context: LlamaContext<'static>,
    model: LlamaModel,
    #[allow(dead_code)]
    raw: RawBackend,
    chat_template_family: ChatTemplateFamily,
    n_ctx: NonZeroU32,
    next_pos: i32,
}

impl LlamaBackend {
    /// Load a GGUF model from disk and create its initial context.
    pub fn load(
        model_path: &str,
        n_ctx: NonZeroU32,
        chat_template_family: ChatTemplateFamily,
    ) -> Result<Self, OrchestratorError> {
        let raw = RawBackend::init()
            .map_err(|e| OrchestratorError::TokenizeFailed(format!("backend init failed: {e}")))?;
        let model_params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(&raw, model_path, &model_params)
            .map_err(|e| OrchestratorError::TokenizeFailed(format!("model load failed: {e}")))?;

        let context = Self::fresh_context(&model, &raw, n_ctx)?;
        Ok(Self {
            context,
            model,
            raw,
            chat_template_family,
            n_ctx,
            next_pos: 0,
        })
    }

    fn fresh_context(
        model: &LlamaModel,
        raw: &RawBackend,
        n_ctx: NonZeroU32,
    ) -> Result<LlamaContext<'static>, OrchestratorError> {
        let ctx_params = LlamaContextParams::default().with_n_ctx(Some(n_ctx));
        // SAFETY: `model` and `raw` are owned by the same `LlamaBackend` the
        // returned context will be stored in, and field order guarantees
        // `context` is dropped before `model`/`raw`.
        unsafe {
            let ctx = model
                .new_context(raw, ctx_params)
                .map_err(|e| OrchestratorError::ContextOverflow(format!("context creation failed: {e}")))?;
            Ok(std::mem::transmute::<LlamaContext<'_>, LlamaContext<'static>>(ctx))
        }
    }
}

impl DecoderBackend for LlamaBackend {
    type Grammar = LlamaSampler;
    type ChainBuilder = Vec<LlamaSampler>;
    type Chain = LlamaSampler;

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, OrchestratorError> {
        self.model
            .str_to_token(text, AddBos::Never)
            .map(|tokens| tokens.into_iter().map(|t| t.0).collect())
            .map_err(|e| OrchestratorError::TokenizeFailed(e.to_string()))
    }

    fn decode(&mut self, tokens: &[TokenId]) -> Result<(), OrchestratorError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let mut batch = LlamaBatch::new(tokens.len(), 1);
        let last = tokens.len() - 1;
        for (i, &token) in tokens.iter().enumerate() {
            batch
                .add(LlamaToken(token), self.next_pos + i as i32, &[0], i == last)
                .map_err(|e| OrchestratorError::DecodeFailed(format!("batch add failed: {e}")))?;
        }
        self.context
            .decode(&mut batch)
            .map_err(|e| OrchestratorError::DecodeFailed(e.to_string()))?;
        self.next_pos += tokens.len() as i32;
        Ok(())
    }

    fn clear_kv_cache(&mut self) {
        match Self::fresh_context(&self.model, &self.raw, self.n_ctx) {
            Ok(ctx) => {
                self.context = ctx;
                self.next_pos = 0;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to recreate context for KV-cache clear");
            }
        }
    }

    fn compile_grammar(
        &self,
        gbnf: &str,
        mode: GrammarMode,
        trigger: &str,
    ) -> Result<Self::Grammar, GrammarError> {
        match mode {
            GrammarMode::Strict => LlamaSampler::grammar(&self.model, gbnf, GRAMMAR_ROOT_RULE)
                .ok_or_else(|| GrammarError::StrictCompileFailed("grammar parse failed".to_string())),
            GrammarMode::Lazy => LlamaSampler::grammar_lazy_patterns(
                &self.model,
                gbnf,
                GRAMMAR_ROOT_RULE,
                &[trigger],
                &[],
            )
            .ok_or_else(|| GrammarError::LazyCompileFailed("grammar parse failed".to_string())),
        }
    }

    fn new_chain_builder(&self) -> Self::ChainBuilder {
        Vec::new()
    }

    fn attach_grammar(&self, builder: &mut Self::ChainBuilder, grammar: Self::Grammar) {
        builder.push(grammar);
    }

    fn attach_mirostat(&self, builder: &mut Self::ChainBuilder, tau: f32, eta: f32, seed: u32) {
        builder.push(LlamaSampler::mirostat(0, seed, tau, eta, 100));
    }

    fn attach_temperature(&self, builder: &mut Self::ChainBuilder, temperature: f32) {
        builder.push(LlamaSampler::temp(temperature));
    }

    fn attach_top_k(&self, builder: &mut Self::ChainBuilder, top_k: i32) {
        builder.push(LlamaSampler::top_k(top_k));
    }

    fn attach_top_p(&self, builder: &mut Self::ChainBuilder, top_p: f32) {
        builder.push(LlamaSampler::top_p(top_p, 1));
    }

    fn attach_min_p(&self, builder: &mut Self::ChainBuilder, min_p: f32) {
        builder.push(LlamaSampler::min_p(min_p, 1));
    }

    fn attach_dist(&self, builder: &mut Self::ChainBuilder, seed: u32) {
        builder.push(LlamaSampler::dist(seed));
    }

    fn attach_greedy(&self, builder: &mut Self::ChainBuilder) {
        builder.push(LlamaSampler::greedy());
    }

    fn finish_chain(&self, builder: Self::ChainBuilder) -> Self::Chain {
        LlamaSampler::chain_simple(builder)
    }

    fn sample_and_accept(&mut self, chain: &mut Self::Chain) -> TokenId {
        let token = chain.sample(&self.context, -1);
        chain.accept(token);
        token.0
    }

    fn token_to_piece(&mut self, token: TokenId) -> Vec<u8> {
        self.model
            .token_to_bytes(LlamaToken(token), Special::Tokenize)
            .unwrap_or_default()
    }

    fn is_end_of_generation(&self, token: TokenId) -> bool {
        token == self.model.token_eos().0
    }

    fn apply_chat_template(&self, messages: &[ChatMessage]) -> String {
        self.chat_template_family.render_prompt(messages)
    }
}
