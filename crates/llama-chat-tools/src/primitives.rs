//! Byte/char scanning primitives shared by the tool-schema parser: skip
//! whitespace, extract a double-quoted string with `\`-escape handling, and
//! find the matching close of a balanced `{…}`/`[…]` pair while skipping
//! string literals — enough to scan JSON structurally without pulling in a
//! full parser.

/// Advance `pos` past any JSON whitespace (space, tab, CR, LF).
#[must_use]
pub fn skip_ws(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\r' | b'\n') {
        pos += 1;
    }
    pos
}

/// Extract a double-quoted string starting at `start` (which must index a
/// `"` byte). Returns the unescaped value and the byte offset just past the
/// closing quote. Returns `None` on an unterminated string.
#[must_use]
pub fn extract_string(s: &str, start: usize) -> Option<(String, usize)> {
    if s.as_bytes().get(start) != Some(&b'"') {
        return None;
    }
    let rest = &s[start + 1..];
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((off, ch)) = chars.next() {
        match ch {
            '"' => return Some((out, start + 1 + off + ch.len_utf8())),
            '\\' => {
                let (_, esc) = chars.next()?;
                match esc {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'u' => {
                        let mut hex = String::with_capacity(4);
                        for _ in 0..4 {
                            let (_, hc) = chars.next()?;
                            hex.push(hc);
                        }
                        let code = u32::from_str_radix(&hex, 16).ok()?;
                        out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    }
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
    None
}

/// Find the matching close of a balanced `{…}`/`[…]` pair starting at
/// `start`. Braces and brackets inside string literals are skipped. `{`/`[`
/// are treated as an undifferentiated "open" depth counter since valid JSON
/// never mismatches bracket types. Returns the offset just past the closing
/// character.
#[must_use]
pub fn find_matching_close(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if !matches!(bytes.get(start), Some(b'{') | Some(b'[')) {
        return None;
    }
    let mut depth: i32 = 0;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let (_, end) = extract_string(s, i)?;
                i = end;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Extract the raw text span of a single JSON value (string, object, array,
/// or bare scalar like `true`/`false`/`null`/a number) starting at `pos`.
#[must_use]
pub fn extract_value_span(s: &str, pos: usize) -> Option<(&str, usize)> {
    match s.as_bytes().get(pos)? {
        b'"' => {
            let (_, end) = extract_string(s, pos)?;
            Some((&s[pos..end], end))
        }
        b'{' | b'[' => {
            let end = find_matching_close(s, pos)?;
            Some((&s[pos..end], end))
        }
        _ => {
            let bytes = s.as_bytes();
            let mut i = pos;
            while i < bytes.len() && !matches!(bytes[i], b',' | b'}' | b']' | b' ' | b'\t' | b'\r' | b'\n') {
                i += 1;
            }
            if i == pos {
                None
            } else {
                Some((&s[pos..i], i))
            }
        }
    }
}

/// Scan a JSON object's text into ordered `(key, raw value text)` pairs.
/// Declaration order is preserved, which downstream grammar generation
/// depends on.
#[must_use]
pub fn scan_object_members(text: &str) -> Vec<(String, String)> {
    let s = text.trim();
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    if bytes.first() != Some(&b'{') {
        return out;
    }
    let mut pos = skip_ws(s, 1);
    if bytes.get(pos) == Some(&b'}') {
        return out;
    }
    loop {
        pos = skip_ws(s, pos);
        let Some((key, after_key)) = extract_string(s, pos) else {
            break;
        };
        pos = skip_ws(s, after_key);
        if s.as_bytes().get(pos) != Some(&b':') {
            break;
        }
        pos = skip_ws(s, pos + 1);
        let Some((value_span, after_value)) = extract_value_span(s, pos) else {
            break;
        };
        out.push((key, value_span.to_string()));
        pos = skip_ws(s, after_value);
        match s.as_bytes().get(pos) {
            Some(b',') => {
                pos += 1;
            }
            _ => break,
        }
    }
    out
}

/// Scan a JSON array of strings into an ordered `Vec<String>`. Non-string
/// elements are skipped rather than aborting the scan.
#[must_use]
pub fn scan_string_array(text: &str) -> Vec<String> {
    let s = text.trim();
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    if bytes.first() != Some(&b'[') {
        return out;
    }
    let mut pos = skip_ws(s, 1);
    loop {
        pos = skip_ws(s, pos);
        match bytes.get(pos) {
            None | Some(b']') => break,
            Some(b'"') => {
                let Some((val, end)) = extract_string(s, pos) else {
                    break;
                };
                out.push(val);
                pos = skip_ws(s, end);
            }
            _ => {
                let Some((_, end)) = extract_value_span(s, pos) else {
                    break;
                };
                pos = skip_ws(s, end);
            }
        }
        match bytes.get(pos) {
            Some(b',') => pos += 1,
            _ => break,
        }
    }
    out
}

/// Split a top-level JSON array's text into the raw text of each object
/// element, skipping malformed trailing content rather than aborting.
#[must_use]
pub fn split_top_level_array(payload: &str) -> Vec<&str> {
    let s = payload.trim();
    let bytes = s.as_bytes();
    let start = skip_ws(s, 0);
    if bytes.get(start) != Some(&b'[') {
        return Vec::new();
    }
    let Some(end) = find_matching_close(s, start) else {
        return Vec::new();
    };
    let inner = &s[start + 1..end - 1];
    let mut items = Vec::new();
    let mut pos = 0;
    loop {
        pos = skip_ws(inner, pos);
        match inner.as_bytes().get(pos) {
            Some(b'{') => {
                let Some(obj_end) = find_matching_close(inner, pos) else {
                    break;
                };
                items.push(&inner[pos..obj_end]);
                pos = obj_end;
            }
            Some(b',') => pos += 1,
            _ => break,
        }
    }
    items
}
