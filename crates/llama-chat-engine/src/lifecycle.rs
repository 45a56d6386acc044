//! Grammar lifecycle manager: builds, caches, clones, and retires the
//! grammar constraint bound to the decoder library, and composes sampler
//! chains in a fixed stage order.
//!
//! A chain is assembled by accumulating stages onto a builder and finishing
//! it in one call, through [`crate::backend::DecoderBackend`]'s
//! `attach_*`/`finish_chain`.

use llama_chat_types::{GrammarError, GrammarMode, SamplerParams};
use llama_chat_tools::{parse_tool_catalog, synthesize_fallback_grammar, synthesize_typed_grammar};

use crate::backend::DecoderBackend;

const LAZY_TRIGGER: &str = "{";

/// The canonical compiled grammar plus the source text it was built from.
/// This instance is never attached directly to a chain — only values
/// returned by `clone_for_chain` are.
struct GrammarTemplate<B: DecoderBackend> {
    gbnf: String,
    mode: GrammarMode,
    /// `None` when every compilation attempt failed: tool calling stays
    /// enabled, but turns proceed unconstrained.
    handle: Option<B::Grammar>,
}

impl<B: DecoderBackend> GrammarTemplate<B> {
    fn clone_for_chain(&self, backend: &B) -> Option<B::Grammar> {
        if self.handle.is_none() {
            return None;
        }
        backend.clone_grammar(&self.gbnf, self.mode, LAZY_TRIGGER).ok()
    }
}

/// Owns at most one canonical compiled grammar, rebuilding it only when the
/// cached catalog text changes.
pub struct GrammarLifecycleManager<B: DecoderBackend> {
    configured_mode: GrammarMode,
    cached_catalog_text: Option<String>,
    template: Option<GrammarTemplate<B>>,
}

impl<B: DecoderBackend> GrammarLifecycleManager<B> {
    #[must_use]
    pub fn new(configured_mode: GrammarMode) -> Self {
        Self {
            configured_mode,
            cached_catalog_text: None,
            template: None,
        }
    }

    /// Force a rebuild on the next `update_if_needed`, even if the catalog
    /// text is unchanged.
    pub fn invalidate(&mut self) {
        self.cached_catalog_text = None;
        self.template = None;
    }

    /// Idempotent: a no-op iff `catalog_text` is byte-identical to the
    /// cached copy and no explicit `invalidate` has been issued since.
    pub fn update_if_needed(&mut self, backend: &B, catalog_text: &str) {
        if self.cached_catalog_text.as_deref() == Some(catalog_text) {
            return;
        }
        self.rebuild(backend, catalog_text);
        // Cache the catalog text regardless of build success, to avoid
        // retrying a failing compile on every turn.
        self.cached_catalog_text = Some(catalog_text.to_string());
    }

    fn rebuild(&mut self, backend: &B, catalog_text: &str) {
        let tools = parse_tool_catalog(catalog_text);
        let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

        let typed = synthesize_typed_grammar(&tools);
        let gbnf = if typed.is_empty() {
            synthesize_fallback_grammar(&tool_names)
        } else {
            typed
        };

        if gbnf.is_empty() {
            tracing::warn!("grammar rebuild: no tools in catalog, leaving unconstrained");
            self.template = None;
            return;
        }

        match self.compile_with_fallback(backend, &gbnf) {
            Ok((handle, mode)) => {
                self.template = Some(GrammarTemplate {
                    gbnf,
                    mode,
                    handle: Some(handle),
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "grammar compilation failed in both modes, proceeding unconstrained");
                self.template = Some(GrammarTemplate {
                    gbnf,
                    mode: self.configured_mode,
                    handle: None,
                });
            }
        }
    }

    /// Attempt compilation in the configured mode, then the alternate
    /// mode, before giving up.
    fn compile_with_fallback(
        &self,
        backend: &B,
        gbnf: &str,
    ) -> Result<(B::Grammar, GrammarMode), GrammarError> {
        let alternate = match self.configured_mode {
            GrammarMode::Strict => GrammarMode::Lazy,
            GrammarMode::Lazy => GrammarMode::Strict,
        };
        match backend.compile_grammar(gbnf, self.configured_mode, LAZY_TRIGGER) {
            Ok(h) => Ok((h, self.configured_mode)),
            Err(first_err) => match backend.compile_grammar(gbnf, alternate, LAZY_TRIGGER) {
                Ok(h) => Ok((h, alternate)),
                Err(_) => Err(first_err),
            },
        }
    }

    /// Reset the canonical constraint's streaming state between turns.
    /// Because this manager never attaches the canonical handle to a
    /// chain, there is no in-place state to reset beyond dropping any
    /// stale clone tracking.
    pub fn reset_grammar(&mut self) {}

    /// Compose a sampler chain in a fixed order: grammar clone first, then
    /// either a single terminal mirostat stage, or temperature → top-k →
    /// top-p → min-p → distribution/greedy.
    pub fn compose_chain(&self, backend: &B, params: &SamplerParams) -> B::Chain {
        let mut builder = backend.new_chain_builder();

        if let Some(template) = &self.template {
            if let Some(grammar) = template.clone_for_chain(backend) {
                backend.attach_grammar(&mut builder, grammar);
            }
        }

        if params.mirostat_mode > 0 {
            backend.attach_mirostat(&mut builder, params.mirostat_tau, params.mirostat_eta, params.seed);
            return backend.finish_chain(builder);
        }

        if params.temperature > 0.0 && (params.temperature - 1.0).abs() > 1e-3 {
            backend.attach_temperature(&mut builder, params.temperature);
        }
        backend.attach_top_k(&mut builder, params.top_k);
        if params.top_p < 1.0 {
            backend.attach_top_p(&mut builder, params.top_p);
        }
        if params.min_p > 0.0 {
            backend.attach_min_p(&mut builder, params.min_p);
        }
        if params.temperature > 0.0 {
            backend.attach_dist(&mut builder, params.seed);
        } else {
            backend.attach_greedy(&mut builder);
        }
        backend.finish_chain(builder)
    }

    /// Whether the last rebuild produced a usable grammar handle (for
    /// callers/tests distinguishing "unconstrained by design" from
    /// "compilation failed").
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        self.template.as_ref().is_some_and(|t| t.handle.is_some())
    }
}
