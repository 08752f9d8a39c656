//! Core data models used throughout Session Harness.
//!
//! These types represent the conversations accepted by the store, the
//! documents read back by the retriever, and the results produced by search.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::SessionError;

/// One conversation turn.
///
/// `content` accepts any JSON value on input and is coerced to text:
/// strings verbatim, `null` as empty, everything else as compact JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, deserialize_with = "content_as_text")]
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

fn content_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

/// Render an arbitrary JSON value as message text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Conversation input: raw text or an ordered list of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conversation {
    Text(String),
    Messages(Vec<Message>),
}

impl Conversation {
    /// Validate an untyped JSON value as a conversation.
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        match value {
            Value::Null => Err(SessionError::InvalidInput(
                "Conversation parameter is required".to_string(),
            )),
            Value::String(text) => Ok(Conversation::Text(text)),
            Value::Array(_) => serde_json::from_value::<Vec<Message>>(value)
                .map(Conversation::Messages)
                .map_err(|e| {
                    SessionError::InvalidInput(format!(
                        "Conversation messages must be objects with a role and content: {}",
                        e
                    ))
                }),
            _ => Err(SessionError::InvalidInput(
                "Conversation must be a string or array of messages".to_string(),
            )),
        }
    }

    /// Reinterpret text under the `messages` format. Text that is JSON must
    /// then be a message sequence (or a string); text that is not JSON stays
    /// text.
    pub fn normalize(self, format: InputFormat) -> Result<Self, SessionError> {
        match (self, format) {
            (Conversation::Text(text), InputFormat::Messages) => {
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) => Conversation::from_value(value),
                    Err(_) => Ok(Conversation::Text(text)),
                }
            }
            (other, _) => Ok(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Conversation::Text(text) => text.trim().is_empty(),
            Conversation::Messages(messages) => messages.is_empty(),
        }
    }

    /// Length of the JSON serialization, used for the input size limit.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }

    /// Text fed to topic extraction: the raw text, or one `role: content`
    /// line per message.
    pub fn topic_source(&self) -> String {
        match self {
            Conversation::Text(text) => text.clone(),
            Conversation::Messages(messages) => messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Declared shape of the conversation input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Plain,
    Messages,
}

impl InputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Plain => "plain",
            InputFormat::Messages => "messages",
        }
    }
}

impl FromStr for InputFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(InputFormat::Plain),
            "messages" => Ok(InputFormat::Messages),
            _ => Err(SessionError::InvalidInput(
                "Format must be either \"plain\" or \"messages\"".to_string(),
            )),
        }
    }
}

/// Caller preference for the encoding of retrieved messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Toon,
    #[default]
    Auto,
}

impl FromStr for OutputFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "toon" => Ok(OutputFormat::Toon),
            "auto" => Ok(OutputFormat::Auto),
            _ => Err(SessionError::InvalidInput(format!(
                "Unknown output format: {}. Use json, toon, or auto.",
                s
            ))),
        }
    }
}

/// Encoding actually used for a retrieved document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Toon,
}

/// A value recovered from a document, or the documented default substituted
/// when recovery was not possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback<T> {
    Parsed(T),
    Default(T),
}

impl<T> Fallback<T> {
    pub fn value(&self) -> &T {
        match self {
            Fallback::Parsed(v) | Fallback::Default(v) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Fallback::Parsed(v) | Fallback::Default(v) => v,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Fallback::Default(_))
    }
}

/// Which on-disk layout a document was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    TopicFolder,
    Legacy,
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutKind::TopicFolder => write!(f, "topic-folder"),
            LayoutKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// Result of a successful store call.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub success: bool,
    pub summary_file: PathBuf,
    pub full_file: PathBuf,
    /// Topic folder name; the identifier to pass to `get`.
    pub filename: String,
    pub topic: String,
    /// Date partition (`YYYY-MM-DD`, local time).
    pub date: String,
    /// Creation timestamp (ISO 8601, local offset).
    pub created_at: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_summary_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_full_file: Option<PathBuf>,
}

/// A document read back by the retriever.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSession {
    pub filename: String,
    pub topic: String,
    pub date: String,
    pub file: PathBuf,
    pub layout: LayoutKind,
    /// Encoded messages, or the plain body when no messages were recovered.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    pub format: Encoding,
}

/// Outcome of a `get` call. Absence is a regular outcome, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Retrieval {
    Found(RetrievedSession),
    NotFound { message: String },
}

impl Retrieval {
    pub fn found(self) -> Option<RetrievedSession> {
        match self {
            Retrieval::Found(session) => Some(session),
            Retrieval::NotFound { .. } => None,
        }
    }
}

/// Listing entry for one stored document.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub filename: String,
    pub topic: String,
    pub date: String,
    pub file: PathBuf,
    pub size: u64,
    pub layout: LayoutKind,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub filename: String,
    pub topic: String,
    pub date: String,
    pub file: PathBuf,
    pub size: u64,
    /// Relevance score in `[0.0, 1.0]`.
    pub relevance_score: f64,
    pub match_count: usize,
    pub snippets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_content_coerced_to_text() {
        let msgs: Vec<Message> = serde_json::from_value(json!([
            { "role": "user", "content": "hi" },
            { "role": "tool", "content": { "ok": true } },
            { "role": "assistant", "content": null },
            { "role": "assistant", "content": 42 }
        ]))
        .unwrap();
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[1].content, r#"{"ok":true}"#);
        assert_eq!(msgs[2].content, "");
        assert_eq!(msgs[3].content, "42");
    }

    #[test]
    fn test_conversation_from_value_rejects_other_shapes() {
        assert!(Conversation::from_value(json!("text")).is_ok());
        let err = Conversation::from_value(json!(12)).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = Conversation::from_value(Value::Null).unwrap_err();
        assert!(err.to_string().contains("required"));
        let err = Conversation::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_normalize_decodes_message_text() {
        let text = r#"[{"role":"user","content":"hello"}]"#.to_string();
        let conv = Conversation::Text(text.clone())
            .normalize(InputFormat::Messages)
            .unwrap();
        assert_eq!(
            conv,
            Conversation::Messages(vec![Message::new("user", "hello")])
        );
        let plain = Conversation::Text(text.clone())
            .normalize(InputFormat::Plain)
            .unwrap();
        assert_eq!(plain, Conversation::Text(text));

        let prose = Conversation::Text("not json at all".into())
            .normalize(InputFormat::Messages)
            .unwrap();
        assert_eq!(prose, Conversation::Text("not json at all".into()));
    }

    #[test]
    fn test_normalize_rejects_json_that_is_not_messages() {
        for text in ["42", "{\"role\": \"user\"}", "[1, 2]", "null"] {
            let err = Conversation::Text(text.into())
                .normalize(InputFormat::Messages)
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT", "accepted {}", text);
        }
    }

    #[test]
    fn test_input_format_parse() {
        assert_eq!("plain".parse::<InputFormat>().unwrap(), InputFormat::Plain);
        let err = "markdown".parse::<InputFormat>().unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
