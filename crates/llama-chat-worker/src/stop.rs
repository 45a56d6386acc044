//! Stop-string detection: chat-template end-of-turn tokens plus a fixed
//! safety-net list, matched against the exact or partial suffix of the
//! accumulated response so a match spanning a chunk boundary is still
//! caught.
//!
//! Checks the exact suffix first, then scans for a partial suffix match
//! that accounts for a match straddling the newly appended text. The
//! orchestrator doesn't check stop strings at all while the tool-call
//! detector is collecting, so there's no separate flag needed to suppress
//! matches inside a buffered call.

/// A stop string was observed; `chars_to_remove` is how many trailing
/// characters of the *already-appended* response must be trimmed because
/// the match straddled the chunk boundary (0 when `new_text` alone
/// completed the match).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopMatch {
    pub matched: String,
    pub chars_to_remove: usize,
}

/// Check whether appending `new_text` to `response` completes any stop
/// string, exactly or partially at the boundary. `</s>` is exempted from
/// partial matching since its short length collides with ordinary
/// HTML/XML-like text.
#[must_use]
pub fn check_stop_conditions(response: &str, new_text: &str, stop_strings: &[String]) -> Option<StopMatch> {
    let test_response = format!("{response}{new_text}");
    let trimmed = test_response.trim_end();

    for stop in stop_strings {
        if stop.is_empty() {
            continue;
        }
        if trimmed.ends_with(stop.as_str()) {
            return Some(StopMatch {
                matched: stop.clone(),
                chars_to_remove: 0,
            });
        }
        if stop == "</s>" || stop.len() <= 2 {
            continue;
        }
        let max_prefix = stop.len().min(trimmed.len());
        // Only ever slice `stop` at its own char boundaries: `stop` may be a
        // caller-supplied multi-byte string, and a raw byte-offset loop would
        // panic the first time a prefix length landed mid-character.
        let boundaries = stop.char_indices().map(|(idx, _)| idx).chain(std::iter::once(stop.len()));
        for i in boundaries {
            if i < 2 || i > max_prefix {
                continue;
            }
            let Some(prefix) = stop.get(..i) else {
                continue;
            };
            if !trimmed.ends_with(prefix) {
                continue;
            }
            if i > new_text.len() {
                if let Some(carried) = stop.get(..i - new_text.len()) {
                    if response.trim_end().ends_with(carried) {
                        return Some(StopMatch {
                            matched: stop.clone(),
                            chars_to_remove: i - new_text.len(),
                        });
                    }
                }
            }
            return Some(StopMatch {
                matched: stop.clone(),
                chars_to_remove: 0,
            });
        }
    }
    None
}
