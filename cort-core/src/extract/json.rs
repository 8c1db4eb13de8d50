//! Locating and parsing JSON inside free-form generator output.

use serde_json::{Map, Value};

/// Candidate JSON slices of `text`, most specific first.
///
/// Tries the whole text, a ```json fenced block, a generic fenced block, and
/// finally the span from the first `open` to the last `close` delimiter.
fn json_candidates(text: &str, open: char, close: char) -> Vec<&str> {
    let mut candidates = vec![text.trim()];

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            candidates.push(text[content_start..content_start + end].trim());
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            candidates.push(text[content_start..content_start + end].trim());
        }
    }

    if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
        if end > start {
            candidates.push(&text[start..=end]);
        }
    }

    candidates
}

/// Find the first JSON array in `text`.
///
/// An object wrapping an `alternatives` array is accepted as well.
pub fn find_json_array(text: &str) -> Option<Vec<Value>> {
    for candidate in json_candidates(text, '[', ']') {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) => return Some(items),
            Ok(Value::Object(mut obj)) => {
                if let Some(Value::Array(items)) = obj.remove("alternatives") {
                    return Some(items);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the first JSON object in `text`.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    json_candidates(text, '{', '}')
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        })
}

/// Parse a list of alternative responses out of generator output.
///
/// Returns `None` when no JSON array could be found at all. A well-formed
/// array with nothing usable in it yields `Some` of an empty list. Items are
/// trimmed and deduplicated in order; numbers and booleans are stringified
/// and objects are unwrapped through their `response`, `text`, `content` or
/// `alternative` field.
pub fn parse_string_list(text: &str) -> Option<Vec<String>> {
    let items = find_json_array(text)?;

    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item_text(&item) else {
            continue;
        };
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    }
    Some(out)
}

fn item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => ["response", "text", "content", "alternative"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Read a non-negative integer index from a JSON value.
///
/// Accepts integers, integral floats and digit strings.
pub fn value_as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|i| usize::try_from(i).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
