//! Markdown rendering for stored documents.
//!
//! Every document is written twice: a short summary page and a full record.
//! The full record embeds the conversation as a fenced JSON block under
//! [`JSON_SECTION`]; that block is what the parser trusts on re-read. The
//! human-readable rendering is best-effort.
//!
//! Message content is written verbatim. A content line that is exactly
//! `---` or opens a code fence can confuse the human-readable section, but
//! never the JSON block, whose strings are escaped onto single lines.

use serde_json::json;

use crate::models::{Conversation, InputFormat, Message};
use crate::naming::{FULL_FILE, SUMMARY_FILE};

/// Heading that introduces the machine-parseable block.
pub const JSON_SECTION: &str = "## Full Conversation (JSON)";

/// Heading of the human-readable section in a full record.
pub const READABLE_SECTION: &str = "## Human-Readable Format";

/// Heading of the conversation section in a summary.
pub const CONVERSATION_SECTION: &str = "## Conversation";

/// Title annotation appended to full-record headings.
pub const FULL_TITLE_SUFFIX: &str = " - Full Context";

/// Separator between rendered turns.
pub const TURN_SEPARATOR: &str = "\n\n---\n\n";

/// Render the summary page.
pub fn format_summary(
    conversation: &Conversation,
    topic: &str,
    format: InputFormat,
    date: &str,
) -> String {
    let mut page = header(
        topic,
        "",
        date,
        "Summary",
        format,
        &format!("**Full Context:** [{0}](./{0})", FULL_FILE),
    );
    page.push_str(CONVERSATION_SECTION);
    page.push_str("\n\n");
    page.push_str(&render_readable(conversation));
    page.push('\n');
    page
}

/// Render the full record with its embedded JSON block.
pub fn format_full_context(
    conversation: &Conversation,
    topic: &str,
    format: InputFormat,
    date: &str,
) -> String {
    let mut page = header(
        topic,
        FULL_TITLE_SUFFIX,
        date,
        "Full Context",
        format,
        &format!("**Summary:** [{0}](./{0})", SUMMARY_FILE),
    );
    page.push_str(JSON_SECTION);
    page.push_str("\n\n```json\n");
    page.push_str(&structured_json(conversation));
    page.push_str("\n```\n\n");
    page.push_str(READABLE_SECTION);
    page.push_str("\n\n");
    page.push_str(&render_readable(conversation));
    page.push('\n');
    page
}

fn header(
    topic: &str,
    title_suffix: &str,
    date: &str,
    kind: &str,
    format: InputFormat,
    sibling: &str,
) -> String {
    format!(
        "# {topic}{title_suffix}\n\n\
         **Date:** {date}\n\
         **Type:** {kind}\n\
         **Format:** {format}\n\
         {sibling}\n\n\
         ---\n\n",
        format = format.as_str(),
    )
}

fn structured_json(conversation: &Conversation) -> String {
    let value = match conversation {
        Conversation::Messages(messages) => json!(messages),
        Conversation::Text(text) => json!({ "format": "plain", "content": text }),
    };
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

fn render_readable(conversation: &Conversation) -> String {
    match conversation {
        Conversation::Messages(messages) => render_turns(messages),
        Conversation::Text(text) => text.clone(),
    }
}

/// Turn-by-turn rendering: bold uppercase role label, blank line, content.
pub fn render_turns(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("**{}:**\n\n{}", m.role.to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join(TURN_SEPARATOR)
}
