//! Sampler parameters and grammar activation mode.

use serde::{Deserialize, Serialize};

/// Grammar activation mode. `Strict` constrains from the first sampled
/// token; `Lazy` stays dormant until the trigger literal `"{"` appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarMode {
    Strict,
    Lazy,
}

/// Sampler parameters, cached between turns so the chain can be rebuilt
/// verbatim each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    pub top_k: i32,
    pub top_p: f32,
    pub temperature: f32,
    pub min_p: f32,
    pub mirostat_mode: u8,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub seed: u32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
            min_p: 0.05,
            mirostat_mode: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            seed: 0xFFFF_FFFF,
        }
    }
}
