//! Multi-turn orchestrator: assembles the conversation, drives per-round
//! generation, routes decoded characters to the tool-call detector and the
//! caller's sinks, dispatches tool execution, and enforces the round
//! budget.
//!
//! Each round clears the KV cache and re-encodes the full conversation from
//! scratch before sampling, and the token loop is bounded by a configurable
//! round budget, the same shape as the stop-string check in [`crate::stop`].

use std::sync::atomic::{AtomicBool, Ordering};

use llama_chat_config::OrchestratorConfig;
use llama_chat_engine::{DecoderBackend, ProcessState};
use llama_chat_types::{ChatMessage, OrchestratorError, ToolCall, ToolExecutor};

use crate::detector::{DetectedCall, ToolCallDetector};
use crate::reframe::Utf8Reframer;
use crate::stop::check_stop_conditions;

const TOOL_CALLING_INSTRUCTION: &str = "You may call a tool by replying with exactly one JSON object of the form {\"tool_calls\":[{\"name\":\"<tool name>\",\"arguments\":{...}}]} and nothing else. If no tool is needed, reply normally in plain text. Available tools (OpenAI function-calling format):\n";

fn system_message(config: &OrchestratorConfig, catalog_text: &str) -> ChatMessage {
    let mut content = String::new();
    if let Some(preamble) = &config.system_preamble {
        content.push_str(preamble);
        content.push('\n');
    }
    content.push_str(TOOL_CALLING_INSTRUCTION);
    content.push_str(catalog_text);
    ChatMessage::system(content)
}

/// Caller-supplied callbacks, invoked synchronously on the orchestrator's
/// own task. Held as trait-object references rather than boxed closures
/// since the orchestrator never needs to outlive the call that supplies
/// them.
pub struct Sinks<'a> {
    pub on_token: &'a mut dyn FnMut(&str),
    pub on_tool_call_detected: &'a mut dyn FnMut(&ToolCall),
    pub on_error: &'a mut dyn FnMut(&OrchestratorError),
    pub on_done: &'a mut dyn FnMut(&str),
}

/// Why a round's token loop stopped.
enum TokenLoopOutcome {
    /// The decoder signalled end-of-generation.
    NaturalEnd,
    /// `max_tokens_per_turn` was reached without a natural end or a call.
    BudgetExhausted,
    /// A stop string was observed; the matched suffix is already trimmed
    /// from `response` by the time this is returned.
    StopMatched,
    /// `stop_requested` was observed at a token boundary.
    Cancelled,
    /// The detector buffered a complete, extractable tool call.
    ToolCall(DetectedCall),
    /// The detector buffered a complete object that didn't extract as a
    /// valid tool call.
    ParseFailure,
}

fn detected_to_tool_call(call: &DetectedCall) -> ToolCall {
    ToolCall {
        name: call.name.clone(),
        arguments: call.arguments.clone(),
        raw: call.raw.clone(),
    }
}

/// Run one round: prefill the full conversation, then sample tokens one at
/// a time, routing each decoded character into the tool-call detector and
/// (when not suppressed) the caller's `on_token` sink and the stop-string
/// check.
#[allow(clippy::too_many_arguments)]
async fn run_round<B: DecoderBackend>(
    process: &ProcessState<B>,
    round: usize,
    catalog_text: &str,
    messages: &[ChatMessage],
    config: &OrchestratorConfig,
    stop_strings: &[String],
    cancel: &AtomicBool,
    sinks: &mut Sinks<'_>,
) -> Result<(TokenLoopOutcome, String), OrchestratorError> {
    let mut guard = process.lock().await;
    let (backend, lifecycle) = guard.backend_and_lifecycle_mut();

    lifecycle.reset_grammar();
    lifecycle.update_if_needed(backend, catalog_text);

    // The very first round starts from an already-empty KV cache; every
    // later round re-encodes the full conversation from scratch, so the
    // cache is cleared before that round's prefill.
    if round > 0 {
        backend.clear_kv_cache();
    }

    let prompt = backend.apply_chat_template(messages);
    let tokens = backend.tokenize(&prompt)?;
    backend.decode(&tokens)?;

    let mut chain = lifecycle.compose_chain(backend, &config.sampler);

    let mut detector = ToolCallDetector::new();
    let mut reframer = Utf8Reframer::new();
    let mut response = String::new();
    let mut tokens_generated: u32 = 0;

    let outcome = 'round: loop {
        if cancel.load(Ordering::Relaxed) {
            break 'round TokenLoopOutcome::Cancelled;
        }
        if tokens_generated >= config.max_tokens_per_turn {
            break 'round TokenLoopOutcome::BudgetExhausted;
        }

        let token = backend.sample_and_accept(&mut chain);
        let bytes = backend.token_to_piece(token);
        let at_end = backend.is_end_of_generation(token);
        tokens_generated += 1;
        let text = reframer.push(&bytes);

        for ch in text.chars() {
            let chunk = ch.to_string();
            let was_collecting = detector.is_collecting();
            let completed = detector.accumulate(&chunk);

            if !was_collecting && !detector.is_collecting() {
                if let Some(stop) = check_stop_conditions(&response, &chunk, stop_strings) {
                    let trimmed_len = response.len().saturating_sub(stop.chars_to_remove);
                    response.truncate(trimmed_len);
                    tracing::debug!(stop = %stop.matched, "stop string matched");
                    break 'round TokenLoopOutcome::StopMatched;
                }
                response.push_str(&chunk);
                (sinks.on_token)(&chunk);
            }

            if completed {
                break 'round match detector.extract() {
                    Some(call) => TokenLoopOutcome::ToolCall(call),
                    None => TokenLoopOutcome::ParseFailure,
                };
            }
        }

        if at_end {
            break 'round TokenLoopOutcome::NaturalEnd;
        }
    };

    let flushed = reframer.flush();
    if !flushed.is_empty() && !matches!(outcome, TokenLoopOutcome::ToolCall(_) | TokenLoopOutcome::ParseFailure) {
        response.push_str(&flushed);
        (sinks.on_token)(&flushed);
    }

    Ok((outcome, response))
}

/// Drive a complete user turn: assemble the system/user messages, run
/// generation rounds until the model replies with plain text, the round
/// budget is exhausted, or an unrecoverable error occurs.
pub async fn generate_with_tools<B: DecoderBackend>(
    process: &ProcessState<B>,
    catalog_text: &str,
    user_message: &str,
    executor: &dyn ToolExecutor,
    config: &OrchestratorConfig,
    cancel: &AtomicBool,
    mut sinks: Sinks<'_>,
) {
    let stop_strings = config.stop_strings();
    let mut messages = vec![system_message(config, catalog_text), ChatMessage::user(user_message)];

    for round in 0..config.max_rounds {
        let span = tracing::info_span!("round", round);
        let _enter = span.enter();

        let (outcome, response) =
            match run_round(process, round, catalog_text, &messages, config, &stop_strings, cancel, &mut sinks).await
            {
                Ok(pair) => pair,
                Err(err) => {
                    (sinks.on_error)(&err);
                    return;
                }
            };

        match outcome {
            TokenLoopOutcome::ToolCall(call) => {
                let tool_call = detected_to_tool_call(&call);
                tracing::debug!(tool = %tool_call.name, "tool call detected");
                (sinks.on_tool_call_detected)(&tool_call);
                let result = executor.execute(&tool_call);
                if result.is_error {
                    tracing::warn!(tool = %tool_call.name, error = %result.result_payload, "tool execution failed");
                }
                messages.push(ChatMessage::assistant(call.raw));
                let tool_content = if result.is_error {
                    format!("error: {}", result.result_payload)
                } else {
                    result.result_payload
                };
                messages.push(ChatMessage::tool(tool_content));
            }
            TokenLoopOutcome::NaturalEnd | TokenLoopOutcome::BudgetExhausted | TokenLoopOutcome::StopMatched => {
                (sinks.on_done)(&response);
                return;
            }
            TokenLoopOutcome::Cancelled => {
                tracing::debug!("generation cancelled");
                (sinks.on_done)(&response);
                return;
            }
            TokenLoopOutcome::ParseFailure => {
                let err = OrchestratorError::ToolCallParseFailure("detected object has neither tool_calls nor name/arguments".to_string());
                (sinks.on_error)(&err);
                return;
            }
        }
    }

    (sinks.on_error)(&OrchestratorError::MaxRoundsExceeded(config.max_rounds));
}

#[cfg(test)]
mod tests {
    use super::*;
    use llama_chat_engine::ScriptedBackend;
    use llama_chat_types::{GrammarMode, SamplerParams, ToolResult};
    use serde_json::json;

    const CATALOG: &str = r#"[{"type":"function","function":{"name":"get_weather","parameters":{"type":"object","properties":{"location":{"type":"string"}},"required":["location"]}}}]"#;

    struct EchoExecutor;
    impl ToolExecutor for EchoExecutor {
        fn execute(&self, call: &ToolCall) -> ToolResult {
            ToolResult::ok(&call.name, json!({"temperature": 15}).to_string())
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_rounds: 4,
            max_tokens_per_turn: 64,
            grammar_mode: GrammarMode::Lazy,
            sampler: SamplerParams::default(),
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn single_tool_round_trip_then_plain_text() {
        let backend = ScriptedBackend::new(vec![
            vec![r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"London"}}]}"#],
            vec!["It's sunny in London."],
        ]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut tokens = Vec::new();
        let mut calls = Vec::new();
        let mut errors = Vec::new();
        let mut done = None;
        let mut sinks = Sinks {
            on_token: &mut |t| tokens.push(t.to_string()),
            on_tool_call_detected: &mut |c| calls.push(c.clone()),
            on_error: &mut |e| errors.push(e.clone()),
            on_done: &mut |d| done = Some(d.to_string()),
        };

        generate_with_tools(&process, CATALOG, "weather in London?", &executor, &config(), &cancel, sinks).await;

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
        assert!(errors.is_empty());
        assert_eq!(done.as_deref(), Some("It's sunny in London."));
    }

    #[tokio::test]
    async fn bare_call_is_wrapped_before_dispatch() {
        let backend = ScriptedBackend::new(vec![
            vec![r#"{"name":"get_weather","arguments":{"location":"London"}}"#],
            vec!["done"],
        ]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut calls = Vec::new();
        let mut sinks = Sinks {
            on_token: &mut |_| {},
            on_tool_call_detected: &mut |c| calls.push(c.clone()),
            on_error: &mut |_| {},
            on_done: &mut |_| {},
        };
        generate_with_tools(&process, CATALOG, "weather?", &executor, &config(), &cancel, sinks).await;

        assert_eq!(
            calls[0].raw,
            r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"London"}}]}"#
        );
    }

    #[tokio::test]
    async fn plain_text_passes_through_without_tool_detection() {
        let backend = ScriptedBackend::new(vec![vec!["Hello, Sam."]]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut tokens = Vec::new();
        let mut calls = Vec::new();
        let mut done = None;
        let mut sinks = Sinks {
            on_token: &mut |t| tokens.push(t.to_string()),
            on_tool_call_detected: &mut |c| calls.push(c.clone()),
            on_error: &mut |_| {},
            on_done: &mut |d| done = Some(d.to_string()),
        };
        generate_with_tools(&process, CATALOG, "hi", &executor, &config(), &cancel, sinks).await;

        assert!(calls.is_empty());
        assert_eq!(tokens.concat(), "Hello, Sam.");
        assert_eq!(done.as_deref(), Some("Hello, Sam."));
    }

    #[tokio::test]
    async fn round_budget_exhaustion_signals_error_with_count() {
        let backend = ScriptedBackend::new(vec![
            vec![r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"A"}}]}"#],
            vec![r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"B"}}]}"#],
        ]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut cfg = config();
        cfg.max_rounds = 2;

        let mut errors = Vec::new();
        let mut done_called = false;
        let mut sinks = Sinks {
            on_token: &mut |_| {},
            on_tool_call_detected: &mut |_| {},
            on_error: &mut |e| errors.push(e.clone()),
            on_done: &mut |_| done_called = true,
        };
        generate_with_tools(&process, CATALOG, "go", &executor, &cfg, &cancel, sinks).await;

        assert!(!done_called);
        assert_eq!(errors, vec![OrchestratorError::MaxRoundsExceeded(2)]);
    }

    #[tokio::test]
    async fn embedded_braces_in_string_do_not_break_extraction() {
        let backend = ScriptedBackend::new(vec![vec![
            r#"{"tool_calls":[{"name":"echo","arguments":{"text":"{not a brace}"}}]}"#,
        ]]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut calls = Vec::new();
        let mut sinks = Sinks {
            on_token: &mut |_| {},
            on_tool_call_detected: &mut |c| calls.push(c.clone()),
            on_error: &mut |_| {},
            on_done: &mut |_| {},
        };
        generate_with_tools(&process, CATALOG, "echo", &executor, &config(), &cancel, sinks).await;

        assert_eq!(calls[0].arguments["text"], "{not a brace}");
    }

    #[tokio::test]
    async fn cancellation_terminates_via_on_done_not_on_error() {
        let backend = ScriptedBackend::new(vec![vec!["partial reply"]]);
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(true);

        let mut errors = Vec::new();
        let mut done = None;
        let mut sinks = Sinks {
            on_token: &mut |_| {},
            on_tool_call_detected: &mut |_| {},
            on_error: &mut |e| errors.push(e.clone()),
            on_done: &mut |d| done = Some(d.to_string()),
        };
        generate_with_tools(&process, CATALOG, "hi", &executor, &config(), &cancel, sinks).await;

        assert!(errors.is_empty());
        assert!(done.is_some());
    }

    #[tokio::test]
    async fn message_list_grows_by_two_per_executed_tool_call() {
        // Two tool-call rounds followed by a terminal plain-text round.
        // Round 0's prefill sees the starting [system, user] pair (len 2);
        // round 1 sees +2 for the first executed call (len 4); round 2 sees
        // +2 more for the second (len 6). A terminal text round appends
        // nothing further.
        let backend = ScriptedBackend::new(vec![
            vec![r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"A"}}]}"#],
            vec![r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"B"}}]}"#],
            vec!["final answer"],
        ]);
        let message_counts = backend.message_counts_handle();
        let process = ProcessState::new(backend, GrammarMode::Lazy, SamplerParams::default());
        let executor = EchoExecutor;
        let cancel = AtomicBool::new(false);

        let mut sinks = Sinks {
            on_token: &mut |_| {},
            on_tool_call_detected: &mut |_| {},
            on_error: &mut |_| {},
            on_done: &mut |_| {},
        };
        generate_with_tools(&process, CATALOG, "go", &executor, &config(), &cancel, sinks).await;

        assert_eq!(*message_counts.borrow(), vec![2, 4, 6]);
    }
}
