//! Streaming tool-call detector and multi-turn orchestrator for the
//! tool-calling orchestration core.

pub mod detector;
pub mod orchestrator;
pub mod reframe;
pub mod stop;

pub use detector::{DetectedCall, ToolCallDetector};
pub use orchestrator::{generate_with_tools, Sinks};
pub use reframe::Utf8Reframer;
pub use stop::{check_stop_conditions, StopMatch};
