//! Linear corpus search.
//!
//! Every document in the selected partitions is read, parsed and scored.
//! There is no index; cost grows with the corpus.
//!
//! # Scoring
//!
//! Case-insensitive, non-overlapping occurrences of the query are counted
//! separately in the topic, the parsed body, and the message contents:
//!
//! ```text
//! score = min(1.0, (3 × topic + 2 × body + 1 × messages) / 10)
//! ```
//!
//! Documents without any occurrence are dropped. Results are ordered by
//! score, then by date (newest first), and truncated afterwards.

use anyhow::Result as CliResult;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;

use crate::config::{SearchSettings, Settings};
use crate::error::{Result, SessionError};
use crate::layout::{self, LayoutEntry};
use crate::models::SearchResult;
use crate::parser::parse_record;
use crate::paths::{absolutize, validate_within_root};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Exact partition; takes precedence over the range bounds.
    pub date: Option<String>,
    /// Inclusive lower bound on partition names.
    pub date_from: Option<String>,
    /// Inclusive upper bound on partition names.
    pub date_to: Option<String>,
    /// Maximum results; `0` means unlimited.
    pub limit: Option<usize>,
    pub root: Option<PathBuf>,
}

/// Serializable search response used by `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchResult>,
    pub message: String,
}

pub struct SessionSearch {
    root: PathBuf,
    params: SearchSettings,
}

impl SessionSearch {
    pub fn new(settings: Settings) -> Self {
        Self {
            root: settings.root,
            params: settings.search,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>> {
        let query = request.query.trim().to_lowercase();
        if query.is_empty() {
            return Err(SessionError::InvalidInput(
                "Search query is required".to_string(),
            ));
        }
        let root = request
            .root
            .as_deref()
            .map(absolutize)
            .unwrap_or_else(|| self.root.clone());

        let partitions: Vec<String> = layout::partitions(&root)
            .await?
            .into_iter()
            .filter(|d| match &request.date {
                Some(date) => d == date,
                None => {
                    request.date_from.as_ref().map_or(true, |from| d >= from)
                        && request.date_to.as_ref().map_or(true, |to| d <= to)
                }
            })
            .collect();

        let mut results = Vec::new();
        for date in &partitions {
            let partition = root.join(date);
            if !validate_within_root(&partition, &root) {
                continue;
            }
            for entry in layout::enumerate(&partition).await? {
                if let Some(result) = self.score_entry(entry, date, &query).await {
                    results.push(result);
                }
            }
        }

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.date.cmp(&a.date))
        });
        // zero means no limit
        if let Some(limit) = request
            .limit
            .or(self.params.default_limit)
            .filter(|&l| l > 0)
        {
            results.truncate(limit);
        }
        tracing::debug!(query = %query, partitions = partitions.len(), hits = results.len(), "search finished");
        Ok(results)
    }

    /// Score one document. Unreadable files are skipped.
    async fn score_entry(&self, entry: LayoutEntry, date: &str, query: &str) -> Option<SearchResult> {
        let text = match tokio::fs::read_to_string(&entry.file).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %entry.file.display(), error = %e, "skipping unreadable session");
                return None;
            }
        };
        let size = text.len() as u64;
        let parsed = parse_record(&text);
        let topic = parsed.topic.into_value();
        let body = parsed.body.into_value();

        let topic_matches = Folded::new(&topic).count(query);
        let folded_body = Folded::new(&body);
        let body_matches = folded_body.count(query);
        let message_matches: usize = parsed
            .messages
            .iter()
            .flatten()
            .map(|m| Folded::new(&m.content).count(query))
            .sum();

        let total = topic_matches + body_matches + message_matches;
        if total == 0 {
            return None;
        }
        let weighted = 3 * topic_matches + 2 * body_matches + message_matches;

        Some(SearchResult {
            filename: entry.id,
            topic,
            date: date.to_string(),
            file: entry.file,
            size,
            relevance_score: (weighted as f64 / 10.0).min(1.0),
            match_count: total,
            snippets: folded_body.snippets(
                &body,
                query,
                self.params.max_snippets,
                self.params.snippet_radius,
            ),
        })
    }
}

/// Lowercased text with a map from each lowercased byte back to the byte
/// offset of the original character it came from.
struct Folded {
    text: String,
    origin: Vec<usize>,
}

impl Folded {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        for (offset, c) in original.char_indices() {
            for lower in c.to_lowercase() {
                text.push(lower);
                origin.resize(text.len(), offset);
            }
        }
        origin.push(original.len());
        Self { text, origin }
    }

    fn count(&self, query: &str) -> usize {
        self.text.match_indices(query).count()
    }

    /// Up to `max` snippets of `radius` characters around each match, cut
    /// from the original text.
    fn snippets(&self, original: &str, query: &str, max: usize, radius: usize) -> Vec<String> {
        self.text
            .match_indices(query)
            .take(max)
            .map(|(at, _)| {
                let start = self.origin[at];
                let end = self.origin[at + query.len()].max(start);
                snippet(original, start, end, radius)
            })
            .collect()
    }
}

fn snippet(text: &str, match_start: usize, match_end: usize, radius: usize) -> String {
    let before: usize = text[..match_start]
        .chars()
        .rev()
        .take(radius)
        .map(char::len_utf8)
        .sum();
    let after: usize = text[match_end..]
        .chars()
        .take(radius)
        .map(char::len_utf8)
        .sum();
    let start = match_start - before;
    let end = match_end + after;

    let prefix = if start > 0 { "..." } else { "" };
    let suffix = if end < text.len() { "..." } else { "" };
    format!("{}{}{}", prefix, text[start..end].trim(), suffix)
}

// ============ CLI output ============

pub async fn run_search(search: &SessionSearch, request: SearchRequest, json: bool) -> CliResult<()> {
    let query = request.query.clone();
    let results = search.search(request).await?;

    if json {
        let response = SearchResponse {
            success: true,
            count: results.len(),
            message: format!(
                "Found {} matching session(s) for \"{}\"",
                results.len(),
                query
            ),
            query,
            results,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}) {} match(es)",
            i + 1,
            r.relevance_score,
            r.topic,
            r.date,
            r.match_count
        );
        println!("    id: {}", r.filename);
        println!("    file: {}", r.file.display());
        for s in &r.snippets {
            println!("    > {}", s.replace('\n', " "));
        }
        println!();
    }
    Ok(())
}
