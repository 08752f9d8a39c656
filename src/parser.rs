//! Read-side parsing of stored documents.
//!
//! Accepts summaries, full records, and legacy single-file documents. The
//! fenced JSON block of a full record is authoritative for messages; the
//! markdown rendering is only consulted when no block decodes.
//!
//! Every field that cannot be recovered is reported as
//! [`Fallback::Default`] rather than silently substituted:
//!
//! | Field | Default |
//! |-------|---------|
//! | topic | `Untitled` |
//! | date | today's local partition |
//! | body | the whole document text |

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::format::{
    CONVERSATION_SECTION, FULL_TITLE_SUFFIX, JSON_SECTION, READABLE_SECTION, TURN_SEPARATOR,
};
use crate::models::{Fallback, Message};
use crate::paths::today_partition;

static ROLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*([^*]+):\*\*$").expect("valid regex"));

const DATE_LABEL: &str = "**Date:**";
const UNTITLED: &str = "Untitled";

/// Fields recovered from a stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub topic: Fallback<String>,
    pub date: Fallback<String>,
    pub body: Fallback<String>,
    pub messages: Option<Vec<Message>>,
}

/// Parse a stored document.
pub fn parse_record(text: &str) -> ParsedRecord {
    let lines: Vec<&str> = text.lines().collect();

    let topic = lines
        .iter()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().replace(FULL_TITLE_SUFFIX, ""))
        .filter(|t| !t.is_empty())
        .map(Fallback::Parsed)
        .unwrap_or_else(|| Fallback::Default(UNTITLED.to_string()));

    let date = lines
        .iter()
        .find_map(|l| l.strip_prefix(DATE_LABEL))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(Fallback::Parsed)
        .unwrap_or_else(|| Fallback::Default(today_partition()));

    let body = match section_body(&lines) {
        Some(body) if !body.is_empty() => Fallback::Parsed(body),
        _ => Fallback::Default(text.to_string()),
    };

    let messages = if text.contains(JSON_SECTION) {
        embedded_messages(&lines).filter(|m| !m.is_empty())
    } else {
        None
    };
    let messages = messages.or_else(|| match &body {
        Fallback::Parsed(body) => messages_from_turns(body),
        Fallback::Default(_) => None,
    });

    ParsedRecord {
        topic,
        date,
        body,
        messages,
    }
}

/// Text under the human-readable section (full records) or the conversation
/// section (summaries, legacy files), up to the next `---` line.
fn section_body(lines: &[&str]) -> Option<String> {
    let start = lines
        .iter()
        .position(|l| l.starts_with(READABLE_SECTION))
        .or_else(|| {
            lines
                .iter()
                .position(|l| l.starts_with(CONVERSATION_SECTION))
        })?;
    let body: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|l| !l.starts_with("---"))
        .copied()
        .collect();
    Some(body.join("\n").trim().to_string())
}

/// Decode the fenced JSON block. Accepts a bare message array or an object
/// with a `messages` array; anything else, including decode errors, yields
/// `None`.
fn embedded_messages(lines: &[&str]) -> Option<Vec<Message>> {
    let open = lines.iter().position(|l| l.starts_with("```json"))?;
    let close = lines[open + 1..]
        .iter()
        .position(|l| l.starts_with("```"))
        .map(|i| open + 1 + i)?;
    let block = lines[open + 1..close].join("\n");

    let value: Value = match serde_json::from_str(&block) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "embedded JSON block did not decode");
            return None;
        }
    };
    let array = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("messages") {
            Some(messages @ Value::Array(_)) => messages,
            _ => return None,
        },
        _ => return None,
    };
    serde_json::from_value(array).ok()
}

/// Rebuild messages from the turn rendering. Sections without a role header
/// or without content are dropped.
fn messages_from_turns(body: &str) -> Option<Vec<Message>> {
    let messages: Vec<Message> = body
        .split(TURN_SEPARATOR)
        .filter_map(|section| {
            let (first, rest) = section.split_once('\n').unwrap_or((section, ""));
            let role = ROLE_HEADER.captures(first)?[1].to_lowercase();
            let content = rest.trim();
            (!content.is_empty()).then(|| Message::new(role, content))
        })
        .collect();
    (!messages.is_empty()).then_some(messages)
}
