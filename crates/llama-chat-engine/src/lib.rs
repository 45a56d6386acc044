//! Grammar lifecycle manager and decoder-backend abstraction for the
//! tool-calling orchestration core.

pub mod backend;
pub mod lifecycle;

#[cfg(feature = "llama-cpp")]
pub mod llama_backend;

pub use backend::{DecoderBackend, ScriptedBackend, TokenId};
pub use lifecycle::GrammarLifecycleManager;

#[cfg(feature = "llama-cpp")]
pub use llama_backend::LlamaBackend;

use llama_chat_types::SamplerParams;

/// The single owned value threaded through orchestrator calls: the decoder
/// backend and the grammar lifecycle manager, behind a coarse
/// initialisation lock plus a per-generation lock.
///
/// An explicit struct rather than a lazily-initialised global, so the
/// backend's teardown runs deterministically with the rest of the process.
pub struct ProcessState<B: DecoderBackend> {
    /// Guards load/release of the backend itself; held briefly, not across
    /// a generation.
    init_lock: std::sync::Mutex<()>,
    /// Guards one live generation at a time: the backend, the lifecycle
    /// manager, and the cached sampler parameters.
    generation_lock: tokio::sync::Mutex<ProcessInner<B>>,
}

struct ProcessInner<B: DecoderBackend> {
    backend: B,
    lifecycle: GrammarLifecycleManager<B>,
    sampler_params: SamplerParams,
}

/// Guard returned by [`ProcessState::lock`], giving exclusive access to the
/// backend and lifecycle manager for the duration of one generation round.
pub struct GenerationGuard<'a, B: DecoderBackend> {
    inner: tokio::sync::MutexGuard<'a, ProcessInner<B>>,
}

impl<B: DecoderBackend> GenerationGuard<'_, B> {
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.inner.backend
    }

    pub fn lifecycle_mut(&mut self) -> &mut GrammarLifecycleManager<B> {
        &mut self.inner.lifecycle
    }

    /// Borrow both the backend and the lifecycle manager at once. Needed
    /// whenever a lifecycle call (`update_if_needed`, `compose_chain`)
    /// requires a `&B` alongside further `&mut B` use in the same scope —
    /// `backend_mut`/`lifecycle_mut` alone can't express that since they
    /// each take `&mut self`.
    pub fn backend_and_lifecycle_mut(&mut self) -> (&mut B, &mut GrammarLifecycleManager<B>) {
        (&mut self.inner.backend, &mut self.inner.lifecycle)
    }

    #[must_use]
    pub fn sampler_params(&self) -> &SamplerParams {
        &self.inner.sampler_params
    }

    pub fn set_sampler_params(&mut self, params: SamplerParams) {
        self.inner.sampler_params = params;
    }
}

impl<B: DecoderBackend> ProcessState<B> {
    pub fn new(backend: B, configured_mode: llama_chat_types::GrammarMode, sampler_params: SamplerParams) -> Self {
        Self {
            init_lock: std::sync::Mutex::new(()),
            generation_lock: tokio::sync::Mutex::new(ProcessInner {
                backend,
                lifecycle: GrammarLifecycleManager::new(configured_mode),
                sampler_params,
            }),
        }
    }

    /// Acquire the per-generation lock for the duration of one round. The
    /// coarse init lock is not held here; it only guards construction and
    /// teardown of the backend itself.
    pub async fn lock(&self) -> GenerationGuard<'_, B> {
        GenerationGuard {
            inner: self.generation_lock.lock().await,
        }
    }

    /// Briefly hold the coarse init lock, e.g. while swapping the backend
    /// out for a freshly loaded one. Not used by the orchestrator's
    /// per-round path, which only needs the finer-grained generation lock.
    pub fn init_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.init_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llama_chat_types::GrammarMode;

    #[tokio::test]
    async fn process_state_serialises_generation_access() {
        let state = ProcessState::new(ScriptedBackend::default(), GrammarMode::Strict, SamplerParams::default());
        let mut guard = state.lock().await;
        assert_eq!(guard.sampler_params().top_k, 40);
        guard.set_sampler_params(SamplerParams {
            top_k: 10,
            ..SamplerParams::default()
        });
        drop(guard);
        let guard = state.lock().await;
        assert_eq!(guard.sampler_params().top_k, 10);
    }
}
