//! TOON (Token-Oriented Object Notation) encoding.
//!
//! A compact, indentation-based rendering of JSON values used for retrieval
//! output. Arrays of uniform objects become tables with a single header
//! line; fields are separated by tabs.
//!
//! ```text
//! messages[3	]{content	role}:
//!   hello	user
//!   hi there	assistant
//!   "a: b"	user
//! ```
//!
//! Only encoding is provided.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Message;

const DELIMITER: char = '\t';
const INDENT: &str = "  ";
const MAX_DEPTH: usize = 64;

/// Below this many items the header overhead is not worth paying.
const MIN_ITEMS: usize = 3;
/// Above this many items the encoding is always used.
const LARGE_ITEMS: usize = 1000;

#[derive(Debug, Error)]
pub enum ToonError {
    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Whether a list is worth encoding compactly: at least three items, and
/// either more than a thousand or all non-null objects sharing the first
/// item's key set.
pub fn is_uniform(items: &[Value]) -> bool {
    if items.len() < MIN_ITEMS {
        return false;
    }
    if items.len() > LARGE_ITEMS {
        return true;
    }
    let Some(first) = items[0].as_object() else {
        return false;
    };
    let keys = sorted_keys(first);
    items
        .iter()
        .all(|item| item.as_object().map(sorted_keys).as_ref() == Some(&keys))
}

fn sorted_keys(map: &Map<String, Value>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

/// Encode messages under a `messages` key when they pass [`is_uniform`].
/// Returns `None` when the list does not qualify or encoding fails.
pub fn encode_messages(messages: &[Message]) -> Option<String> {
    let values: Vec<Value> = messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
        .collect();
    if !is_uniform(&values) {
        return None;
    }
    let mut root = Map::new();
    root.insert("messages".to_string(), Value::Array(values));
    match encode(&Value::Object(root)) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "TOON encoding failed; falling back to JSON");
            None
        }
    }
}

/// Encode an arbitrary JSON value.
pub fn encode(value: &Value) -> Result<String, ToonError> {
    let mut encoder = Encoder::default();
    match value {
        Value::Object(map) => encoder.object(map, 0)?,
        Value::Array(items) => encoder.array("", items, 0)?,
        primitive => encoder.lines.push(primitive_text(primitive)),
    }
    Ok(encoder.lines.join("\n"))
}

#[derive(Default)]
struct Encoder {
    lines: Vec<String>,
}

impl Encoder {
    fn push(&mut self, depth: usize, text: String) {
        self.lines.push(format!("{}{}", INDENT.repeat(depth), text));
    }

    fn object(&mut self, map: &Map<String, Value>, depth: usize) -> Result<(), ToonError> {
        check_depth(depth)?;
        for (key, value) in map {
            self.field(&key_text(key), value, depth)?;
        }
        Ok(())
    }

    fn field(&mut self, key: &str, value: &Value, depth: usize) -> Result<(), ToonError> {
        match value {
            Value::Object(map) => {
                self.push(depth, format!("{}:", key));
                self.object(map, depth + 1)
            }
            Value::Array(items) => self.array(key, items, depth),
            primitive => {
                self.push(depth, format!("{}: {}", key, primitive_text(primitive)));
                Ok(())
            }
        }
    }

    fn array(&mut self, key: &str, items: &[Value], depth: usize) -> Result<(), ToonError> {
        check_depth(depth)?;
        let len = items.len();
        if items.is_empty() {
            self.push(depth, format!("{}[0]:", key));
            return Ok(());
        }

        if items.iter().all(is_primitive) {
            let row = join_row(items.iter());
            self.push(depth, format!("{}[{}{}]: {}", key, len, DELIMITER, row));
            return Ok(());
        }

        if let Some(fields) = table_fields(items) {
            let header: Vec<String> = fields.iter().map(|f| key_text(f)).collect();
            self.push(
                depth,
                format!(
                    "{}[{}{}]{{{}}}:",
                    key,
                    len,
                    DELIMITER,
                    header.join(&DELIMITER.to_string())
                ),
            );
            for item in items.iter().filter_map(Value::as_object) {
                let row = join_row(fields.iter().map(|f| &item[f.as_str()]));
                self.push(depth + 1, row);
            }
            return Ok(());
        }

        self.push(depth, format!("{}[{}{}]:", key, len, DELIMITER));
        for item in items {
            self.list_item(item, depth + 1)?;
        }
        Ok(())
    }

    /// Emit `- <item>`. Structured items are encoded one level deeper and
    /// their first line is re-prefixed with the hyphen.
    fn list_item(&mut self, item: &Value, depth: usize) -> Result<(), ToonError> {
        let start = self.lines.len();
        match item {
            Value::Object(map) if map.is_empty() => {
                self.push(depth, "-".to_string());
                return Ok(());
            }
            Value::Object(map) => self.object(map, depth + 1)?,
            Value::Array(items) => self.array("", items, depth + 1)?,
            primitive => {
                self.push(depth, format!("- {}", primitive_text(primitive)));
                return Ok(());
            }
        }
        if let Some(first) = self.lines.get_mut(start) {
            *first = format!("{}- {}", INDENT.repeat(depth), first.trim_start());
        }
        Ok(())
    }
}

fn check_depth(depth: usize) -> Result<(), ToonError> {
    if depth > MAX_DEPTH {
        Err(ToonError::TooDeep(MAX_DEPTH))
    } else {
        Ok(())
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Shared field list when every item is an object with the same keys and
/// only primitive values.
fn table_fields(items: &[Value]) -> Option<Vec<String>> {
    let first = items.first()?.as_object()?;
    if first.is_empty() {
        return None;
    }
    let fields: Vec<String> = first.keys().cloned().collect();
    let tabular = items.iter().all(|item| {
        item.as_object().is_some_and(|map| {
            map.len() == fields.len()
                && fields
                    .iter()
                    .all(|f| map.get(f).is_some_and(is_primitive))
        })
    });
    tabular.then_some(fields)
}

fn join_row<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(primitive_text)
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_text(s),
        other => other.to_string(),
    }
}

fn string_text(s: &str) -> String {
    if needs_quotes(s) {
        quote(s)
    } else {
        s.to_string()
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s != s.trim()
        || matches!(s, "true" | "false" | "null")
        || s.parse::<f64>().is_ok()
        || s.starts_with('-')
        || s.chars().any(|c| {
            c == DELIMITER
                || c.is_control()
                || matches!(c, ':' | '"' | '\\' | '[' | ']' | '{' | '}')
        })
}

fn key_text(key: &str) -> String {
    let mut chars = key.chars();
    let bare = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if bare {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msgs(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::new(if i % 2 == 0 { "user" } else { "assistant" }, format!("turn {}", i)))
            .collect()
    }

    #[test]
    fn test_is_uniform() {
        assert!(!is_uniform(&[json!({"a": 1}), json!({"a": 2})]));
        assert!(is_uniform(&[json!({"a": 1, "b": 2}), json!({"b": 0, "a": 2}), json!({"a": 3, "b": 1})]));
        assert!(!is_uniform(&[json!({"a": 1}), json!({"b": 2}), json!({"a": 3})]));
        assert!(!is_uniform(&[json!({"a": 1}), Value::Null, json!({"a": 3})]));
        assert!(!is_uniform(&[json!(1), json!(2), json!(3)]));

        let mixed: Vec<Value> = (0..1001).map(|i| if i % 2 == 0 { json!(i) } else { json!({"x": i}) }).collect();
        assert!(is_uniform(&mixed));
    }

    #[test]
    fn test_encode_messages_table() {
        let text = encode_messages(&msgs(3)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        if lines[0] == "messages[3\t]{content\trole}:" {
            assert_eq!(lines[1], "  turn 0\tuser");
            assert_eq!(lines[2], "  turn 1\tassistant");
        } else {
            assert_eq!(lines[0], "messages[3\t]{role\tcontent}:");
            assert_eq!(lines[1], "  user\tturn 0");
        }
    }

    #[test]
    fn test_encode_messages_too_few() {
        assert!(encode_messages(&msgs(2)).is_none());
    }

    #[test]
    fn test_quoting() {
        let text = encode(&json!({
            "a": "",
            "b": " padded",
            "c": "true",
            "d": "42",
            "e": "key: value",
            "f": "line\nbreak",
            "g": "tab\there",
            "h": "- dash",
            "i": "plain words"
        }))
        .unwrap();
        assert!(text.contains("a: \"\""));
        assert!(text.contains("b: \" padded\""));
        assert!(text.contains("c: \"true\""));
        assert!(text.contains("d: \"42\""));
        assert!(text.contains("e: \"key: value\""));
        assert!(text.contains("f: \"line\\nbreak\""));
        assert!(text.contains("g: \"tab\\there\""));
        assert!(text.contains("h: \"- dash\""));
        assert!(text.contains("i: plain words"));
    }

    #[test]
    fn test_nested_structures() {
        let text = encode(&json!({
            "tags": ["a", "b"],
            "meta": { "count": 2, "ok": true },
            "mixed": [1, { "x": 1, "y": [2] }],
            "empty": []
        }))
        .unwrap();
        assert!(text.contains("tags[2\t]: a\tb"));
        assert!(text.contains("meta:\n  count: 2\n  ok: true"));
        assert!(text.contains("mixed[2\t]:\n  - 1\n  - x: 1\n    y[1\t]: 2"));
        assert!(text.contains("empty[0]:"));
    }

    #[test]
    fn test_quoted_keys() {
        let text = encode(&json!({ "has space": 1 })).unwrap();
        assert_eq!(text, "\"has space\": 1");
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(1);
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!({ "n": value });
        }
        assert!(matches!(encode(&value), Err(ToonError::TooDeep(_))));
    }
}
