//! UTF-8 re-framing: individual decoder tokens may yield byte fragments
//! that don't align to code-point boundaries. This holds a small
//! pending-byte buffer, emits only complete code points, and flushes a
//! single U+FFFD at end-of-stream if bytes remain.
//!
//! Generalizes `std::str::from_utf8`'s incomplete-sequence error into an
//! explicit carry-over buffer, since per-token output otherwise can't be
//! assumed to be a renderable `&str` on its own.

/// Accumulates raw decoder bytes and yields only well-formed UTF-8 text,
/// carrying incomplete trailing sequences across calls.
#[derive(Debug, Default)]
pub struct Utf8Reframer {
    pending: Vec<u8>,
}

impl Utf8Reframer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from one `token_to_piece` call. Returns the longest
    /// prefix that decodes to well-formed UTF-8; any trailing incomplete
    /// sequence is retained for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(all) => {
                let out = all.to_string();
                self.pending.clear();
                out
            }
            Err(err) => {
                let valid_len = err.valid_up_to();
                let out = std::str::from_utf8(&self.pending[..valid_len])
                    .expect("valid_up_to guarantees this prefix is well-formed UTF-8")
                    .to_string();
                self.pending.drain(..valid_len);
                out
            }
        }
    }

    /// Flush any remaining incomplete bytes at end-of-stream as a single
    /// U+FFFD replacement character, or an empty string if nothing is
    /// pending.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            "\u{FFFD}".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_chunks_pass_through_unchanged() {
        let mut reframer = Utf8Reframer::new();
        assert_eq!(reframer.push("hello".as_bytes()), "hello");
        assert_eq!(reframer.flush(), "");
    }

    #[test]
    fn split_multibyte_character_is_held_until_complete() {
        // "é" is 2 bytes (0xC3 0xA9) in UTF-8.
        let bytes = "é".as_bytes().to_vec();
        let mut reframer = Utf8Reframer::new();
        assert_eq!(reframer.push(&bytes[..1]), "");
        assert_eq!(reframer.push(&bytes[1..]), "é");
    }

    #[test]
    fn trailing_incomplete_bytes_flush_as_replacement_char() {
        let bytes = "é".as_bytes().to_vec();
        let mut reframer = Utf8Reframer::new();
        reframer.push(&bytes[..1]);
        assert_eq!(reframer.flush(), "\u{FFFD}");
    }

    #[test]
    fn concatenation_law_holds_across_a_stream() {
        let input = "hello \u{1F600} world".as_bytes().to_vec();
        let mut reframer = Utf8Reframer::new();
        let mut out = String::new();
        // Feed one byte at a time to exercise every split boundary.
        for b in &input {
            out.push_str(&reframer.push(std::slice::from_ref(b)));
        }
        out.push_str(&reframer.flush());
        assert_eq!(out, "hello \u{1F600} world");
    }

    #[test]
    fn flush_on_fully_consumed_stream_is_a_no_op() {
        let mut reframer = Utf8Reframer::new();
        reframer.push("clean".as_bytes());
        assert_eq!(reframer.flush(), "");
    }
}
