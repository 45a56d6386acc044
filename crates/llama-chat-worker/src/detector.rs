//! Streaming tool-call detector: accumulates emitted characters into a
//! brace-balanced JSON object and extracts the tool name and canonicalised
//! payload once the object is complete.
//!
//! The byte-wise `depth`/`in_string`/`prev_backslash` scan skips braces
//! inside string literals without needing a full JSON parser mid-stream.
//! Once an object is balanced, it is validated and parsed in one shot with
//! `serde_json::from_str` rather than hand-rolling object construction.

use serde_json::Value;

use llama_chat_tools::primitives::{extract_string, scan_object_members};

/// A detected, canonicalised tool call ready to hand to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCall {
    pub name: String,
    pub arguments: Value,
    /// The emitted payload text, always in the enveloped
    /// `{"tool_calls":[...]}` shape.
    pub raw: String,
}

/// Byte-wise brace-balanced scanner. Invariants: `collecting ⇒ depth ≥ 1`;
/// `!collecting ⇒ buf.empty() ∧ depth = 0`. A just-completed object is
/// moved out of `buffer` into `completed` in the same step that `depth`
/// reaches zero, so
/// the invariant holds continuously rather than only between calls.
#[derive(Debug, Default)]
pub struct ToolCallDetector {
    buffer: Vec<u8>,
    collecting: bool,
    depth: i32,
    in_string: bool,
    prev_backslash: bool,
    completed: Option<Vec<u8>>,
}

impl ToolCallDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Feed one chunk of decoded text (typically a single re-framed
    /// code point). Returns `true` iff a complete top-level JSON object was
    /// buffered during this call; call [`Self::extract`] immediately
    /// afterwards, before any further `accumulate`, to read it.
    pub fn accumulate(&mut self, chunk: &str) -> bool {
        let mut completed_this_call = false;
        for &byte in chunk.as_bytes() {
            if !self.collecting {
                if byte == b'{' {
                    self.collecting = true;
                    self.depth = 1;
                    self.in_string = false;
                    self.prev_backslash = false;
                    self.buffer.clear();
                    self.buffer.push(byte);
                }
                continue;
            }

            self.buffer.push(byte);

            if self.in_string {
                if byte == b'"' && !self.prev_backslash {
                    self.in_string = false;
                }
                self.prev_backslash = byte == b'\\' && !self.prev_backslash;
                continue;
            }

            match byte {
                b'"' => {
                    self.in_string = true;
                    self.prev_backslash = false;
                }
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.completed = Some(std::mem::take(&mut self.buffer));
                        self.collecting = false;
                        completed_this_call = true;
                    }
                }
                _ => {}
            }
        }
        completed_this_call
    }

    /// Parse the most recently completed object. Returns `None` if nothing
    /// is buffered, the buffered bytes aren't valid UTF-8/JSON, or the
    /// object qualifies as neither a `tool_calls` envelope nor a bare
    /// `{"name":...,"arguments":...}` call.
    #[must_use]
    pub fn extract(&self) -> Option<DetectedCall> {
        let bytes = self.completed.as_ref()?;
        let text = std::str::from_utf8(bytes).ok()?;
        let value: Value = serde_json::from_str(text).ok()?;
        let obj = value.as_object()?;

        let (envelope, raw) = if obj.contains_key("tool_calls") {
            (value.clone(), text.to_string())
        } else if obj.contains_key("name") && obj.contains_key("arguments") {
            let synthesized = Value::Object(serde_json::Map::from_iter([(
                "tool_calls".to_string(),
                Value::Array(vec![value.clone()]),
            )]));
            let raw = synthesized.to_string();
            (synthesized, raw)
        } else {
            return None;
        };

        let first_call = envelope.get("tool_calls")?.as_array()?.first()?;
        let arguments = first_call
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let name = extract_name(text).unwrap_or_else(|| "tool".to_string());

        Some(DetectedCall { name, arguments, raw })
    }

    /// Clear all state, including the completed buffer, ready for the next
    /// call: called after each extracted call and before the next turn.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.collecting = false;
        self.depth = 0;
        self.in_string = false;
        self.prev_backslash = false;
        self.completed = None;
    }
}

/// Locate the first `"name"` key in `text` and read its quoted value. Works
/// directly against the raw object text rather than the parsed `Value`, so
/// a tool call nested one level inside a `tool_calls` array still resolves
/// to the call's own name rather than a top-level key that happens to also
/// be called `name`.
fn extract_name(text: &str) -> Option<String> {
    for (key, value_span) in scan_object_members(text) {
        if key == "name" {
            if let Some((name, _)) = extract_string(value_span.trim(), 0) {
                return Some(name);
            }
        }
        if let Some(nested) = find_nested_name(&value_span) {
            return Some(nested);
        }
    }
    None
}

fn find_nested_name(value_span: &str) -> Option<String> {
    let trimmed = value_span.trim();
    if trimmed.starts_with('{') {
        for (key, inner_span) in scan_object_members(trimmed) {
            if key == "name" {
                return extract_string(inner_span.trim(), 0).map(|(s, _)| s);
            }
            if let Some(found) = find_nested_name(&inner_span) {
                return Some(found);
            }
        }
    } else if trimmed.starts_with('[') {
        for item in llama_chat_tools::primitives::split_top_level_array(trimmed) {
            if let Some(found) = find_nested_name(item) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_state_has_empty_buffer_and_zero_depth() {
        let detector = ToolCallDetector::new();
        assert!(!detector.is_collecting());
        assert_eq!(detector.depth, 0);
        assert!(detector.buffer.is_empty());
    }

    #[test]
    fn collecting_implies_depth_at_least_one() {
        let mut detector = ToolCallDetector::new();
        detector.accumulate("{\"tool_cal");
        assert!(detector.is_collecting());
        assert!(detector.depth >= 1);
    }

    #[test]
    fn completes_exactly_when_outer_brace_closes() {
        let mut detector = ToolCallDetector::new();
        assert!(!detector.accumulate("{\"name\":\"echo\","));
        assert!(detector.accumulate("\"arguments\":{}}"));
        assert!(!detector.is_collecting());
    }

    #[test]
    fn braces_inside_string_literals_do_not_affect_depth() {
        let mut detector = ToolCallDetector::new();
        let chunk = r#"{"tool_calls":[{"name":"echo","arguments":{"text":"{not a brace}"}}]}"#;
        assert!(detector.accumulate(chunk));
        let call = detector.extract().unwrap();
        assert_eq!(call.name, "echo");
        assert_eq!(call.arguments["text"], "{not a brace}");
    }

    #[test]
    fn escaped_quote_inside_string_does_not_end_it_early() {
        let mut detector = ToolCallDetector::new();
        let chunk = r#"{"name":"echo","arguments":{"text":"a\"b}"}}"#;
        assert!(detector.accumulate(chunk));
        let call = detector.extract().unwrap();
        assert_eq!(call.arguments["text"], "a\"b}");
    }

    #[test]
    fn bare_name_arguments_object_is_wrapped_in_envelope() {
        let mut detector = ToolCallDetector::new();
        detector.accumulate(r#"{"name":"get_weather","arguments":{"location":"London"}}"#);
        let call = detector.extract().unwrap();
        assert_eq!(
            call.raw,
            r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"London"}}]}"#
        );
    }

    #[test]
    fn tool_calls_envelope_is_emitted_as_is() {
        let mut detector = ToolCallDetector::new();
        let chunk = r#"{"tool_calls":[{"name":"get_weather","arguments":{"location":"London"}}]}"#;
        detector.accumulate(chunk);
        let call = detector.extract().unwrap();
        assert_eq!(call.raw, chunk);
        assert_eq!(call.name, "get_weather");
    }

    #[test]
    fn missing_name_falls_back_to_literal_tool() {
        let mut detector = ToolCallDetector::new();
        detector.accumulate(r#"{"tool_calls":[{"arguments":{}}]}"#);
        let call = detector.extract().unwrap();
        assert_eq!(call.name, "tool");
    }

    #[test]
    fn object_with_neither_shape_extracts_nothing() {
        let mut detector = ToolCallDetector::new();
        detector.accumulate(r#"{"hello":"world"}"#);
        assert!(detector.extract().is_none());
    }

    #[test]
    fn reset_clears_completed_state() {
        let mut detector = ToolCallDetector::new();
        detector.accumulate(r#"{"name":"echo","arguments":{}}"#);
        assert!(detector.extract().is_some());
        detector.reset();
        assert!(detector.extract().is_none());
        assert!(!detector.is_collecting());
    }

    #[test]
    fn detector_round_trip_preserves_bytes_exactly() {
        let object = r#"{"tool_calls":[{"name":"t","arguments":{"a":1,"b":"  spaced  "}}]}"#;
        let mut detector = ToolCallDetector::new();
        for ch in object.chars() {
            detector.accumulate(&ch.to_string());
        }
        let call = detector.extract().unwrap();
        // Re-serialisation through serde_json may reorder whitespace but
        // must preserve every key/value byte-for-byte in content.
        assert_eq!(call.arguments["a"], 1);
        assert_eq!(call.arguments["b"], "  spaced  ");
    }

    #[test]
    fn incomplete_sequence_at_chunk_boundary_stays_buffered() {
        let mut detector = ToolCallDetector::new();
        assert!(!detector.accumulate("{\"name\":\"ec"));
        assert!(detector.is_collecting());
        assert!(detector.extract().is_none());
    }
}
