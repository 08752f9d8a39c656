//! Heuristic topic derivation.
//!
//! Produces a filesystem-safe, non-empty topic. There is no guarantee of
//! topical accuracy. Branches are tried in order and the first one that
//! yields a non-empty slug wins:
//!
//! 1. the caller-provided topic;
//! 2. the first `user:` line with 6..=99 characters of content;
//! 3. the first non-empty line with 6..=99 characters that is not a reply;
//! 4. up to three keyword-like words from the first 200 characters;
//! 5. `session-<unix millis>`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::naming::slugify;

static USER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^user:\s*(.+)").expect("valid regex"));

static ACTION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(implement|add|create|fix|refactor|update)").expect("valid regex")
});

const REPLY_MARKERS: &[&str] = &["ai:", "assistant:"];
const PREVIEW_CHARS: usize = 200;
const MAX_KEYWORDS: usize = 3;

fn reasonable_length(s: &str) -> bool {
    (6..=99).contains(&s.chars().count())
}

fn non_empty(slug: String) -> Option<String> {
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Derive a topic slug for a conversation.
pub fn extract_topic(text: &str, provided: Option<&str>) -> String {
    if let Some(topic) = provided
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| non_empty(slugify(t)))
    {
        return topic;
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let from_user_line = lines.iter().find_map(|line| {
        USER_LINE
            .captures(line)
            .map(|c| c[1].trim().to_string())
            .filter(|content| reasonable_length(content))
    });
    if let Some(topic) = from_user_line.and_then(|c| non_empty(slugify(&c))) {
        return topic;
    }

    if let Some(first) = lines.first().map(|l| l.trim()) {
        let lower = first.to_lowercase();
        let is_reply = REPLY_MARKERS.iter().any(|m| lower.starts_with(m));
        if reasonable_length(first) && !is_reply {
            if let Some(topic) = non_empty(slugify(first)) {
                return topic;
            }
        }
    }

    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    let keywords = extract_keywords(&preview);
    if !keywords.is_empty() {
        if let Some(topic) = non_empty(slugify(&keywords.join("-"))) {
            return topic;
        }
    }

    format!("session-{}", chrono::Utc::now().timestamp_millis())
}

fn extract_keywords(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .filter(|w| w.starts_with(|c: char| c.is_ascii_uppercase()) || ACTION_WORD.is_match(w))
        .take(MAX_KEYWORDS)
        .map(|w| {
            w.to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                .collect()
        })
        .collect()
}
