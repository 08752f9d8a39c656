//! Conversion of exported chat transcripts into messages.
//!
//! Two export shapes are understood, selected by file extension:
//!
//! | Extension | Shape |
//! |-----------|-------|
//! | `.json` | Structured export: `{"requests": [{"message": {...}, "response": [...]}]}`, a bare `[{role, content}]` array, or `{"messages": [...]}` |
//! | anything else | Line-oriented markdown export with `**User**` / `**Assistant**` (or `**Cursor**`) markers |
//!
//! Imported roles are normalized to `user` and `assistant`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Result, SessionError};
use crate::format::TURN_SEPARATOR;
use crate::models::{value_to_text, Message};

static USER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*\*user(\*\*|\s*)$").expect("valid regex"));

static ASSISTANT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*\*(cursor|assistant)(\*\*|\s*)$").expect("valid regex"));

/// Response fragment kinds that carry tool plumbing rather than text.
const SKIPPED_KINDS: &[&str] = &[
    "mcpServersStarting",
    "prepareToolInvocation",
    "toolInvocationSerialized",
    "toolInvocation",
];

/// Leading lines inspected for export headers.
const HEADER_LINES: usize = 5;

/// Read and parse an export file.
pub async fn load_export(path: &Path) -> Result<Vec<Message>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SessionError::ExportFileNotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) => {
            return Err(SessionError::ExportParse {
                message: format!("Failed to read export file {}: {}", path.display(), e),
            })
        }
    };

    let messages = parse_export(&content, path)?;
    if messages.is_empty() {
        return Err(SessionError::ExportParse {
            message: format!("No messages found in export file {}", path.display()),
        });
    }
    tracing::debug!(file = %path.display(), messages = messages.len(), "parsed export");
    Ok(messages)
}

/// Parse export text, choosing the shape from the file extension.
pub fn parse_export(content: &str, path: &Path) -> Result<Vec<Message>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        parse_structured_export(content)
    } else {
        Ok(parse_markdown_export(content))
    }
}

// ============ Markdown export ============

/// Parse a markdown export. Text before the first role marker is ignored,
/// and so are header lines (headings, blank lines, `Exported on ...`) among
/// the first five.
pub fn parse_markdown_export(markdown: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut role: Option<&'static str> = None;
    let mut current: Vec<&str> = Vec::new();

    for (i, line) in markdown.lines().enumerate() {
        if i < HEADER_LINES
            && (line.starts_with('#') || line.contains("Exported on") || line.trim().is_empty())
        {
            continue;
        }

        let next_role = if USER_MARKER.is_match(line) {
            Some("user")
        } else if ASSISTANT_MARKER.is_match(line) {
            Some("assistant")
        } else {
            None
        };
        if let Some(next) = next_role {
            flush(&mut messages, role, &mut current);
            role = Some(next);
            continue;
        }

        let trimmed = line.trim();
        if (trimmed == "---" || trimmed.is_empty()) && current.is_empty() {
            continue;
        }
        if role.is_some() {
            current.push(line);
        }
    }
    flush(&mut messages, role, &mut current);
    messages
}

fn flush(messages: &mut Vec<Message>, role: Option<&str>, current: &mut Vec<&str>) {
    if let Some(role) = role {
        let content = current.join("\n");
        let content = content.trim();
        let content = content.strip_suffix("---").unwrap_or(content).trim_end();
        if !content.is_empty() {
            messages.push(Message::new(role, content));
        }
    }
    current.clear();
}

// ============ Structured export ============

/// Parse a structured (JSON) export.
pub fn parse_structured_export(json: &str) -> Result<Vec<Message>> {
    let data: Value = serde_json::from_str(json).map_err(|e| SessionError::ExportParse {
        message: format!("Failed to parse JSON export: {}", e),
    })?;

    if let Some(requests) = data.get("requests").and_then(Value::as_array) {
        return Ok(requests.iter().flat_map(request_messages).collect());
    }
    if let Some(items) = data.as_array() {
        return Ok(role_content_messages(items));
    }
    if let Some(items) = data.get("messages").and_then(Value::as_array) {
        return Ok(role_content_messages(items));
    }
    Ok(Vec::new())
}

/// One request: the user's message, then every response fragment joined
/// into a single assistant message.
fn request_messages(request: &Value) -> Vec<Message> {
    let mut out = Vec::with_capacity(2);

    if let Some(message) = request.get("message").filter(|m| m.is_object()) {
        let text = message
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let user = match text {
            Some(text) => Some(text.to_string()),
            None => message.get("parts").and_then(Value::as_array).map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .filter(|t| !t.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
                    .trim()
                    .to_string()
            }),
        };
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            out.push(Message::new("user", user));
        }
    }

    if let Some(fragments) = request.get("response").and_then(Value::as_array) {
        let parts: Vec<&str> = fragments
            .iter()
            .filter(|f| {
                let kind = f.get("kind").and_then(Value::as_str);
                !kind.is_some_and(|k| SKIPPED_KINDS.contains(&k))
            })
            .filter_map(|f| f.get("value").and_then(Value::as_str))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        if !parts.is_empty() {
            out.push(Message::new("assistant", parts.join("\n\n")));
        }
    }
    out
}

fn role_content_messages(items: &[Value]) -> Vec<Message> {
    items
        .iter()
        .filter_map(|item| {
            let role = item.get("role")?;
            let content = item.get("content")?;
            let role = if role.as_str() == Some("user") {
                "user"
            } else {
                "assistant"
            };
            Some(Message::new(role, value_to_text(content)))
        })
        .collect()
}

/// Render messages as `USER:` / `ASSISTANT:` blocks separated by rules.
pub fn messages_to_plain_text(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let label = if m.role == "user" { "USER" } else { "ASSISTANT" };
            format!("{}:\n\n{}", label, m.content)
        })
        .collect::<Vec<_>>()
        .join(TURN_SEPARATOR)
}
