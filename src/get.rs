//! Document retrieval and listing.
//!
//! Reads documents back from either on-disk layout (see [`crate::layout`]).
//! Used by the `sessions get` and `sessions list` commands.

use anyhow::Result as CliResult;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Result, SessionError};
use crate::layout;
use crate::models::{
    Encoding, Fallback, LayoutKind, Message, OutputFormat, Retrieval, RetrievedSession,
    SessionInfo,
};
use crate::naming::{legacy_date, topic_from_name};
use crate::parser::parse_record;
use crate::paths::{absolutize, today_partition, validate_within_root};
use crate::toon::encode_messages;

#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    /// Topic folder name, optionally with `/full.md` or `/summary.md`, or a
    /// legacy base name or file name.
    pub id: String,
    /// Date partition; derived from a legacy identifier or today when absent.
    pub date: Option<String>,
    /// Encoding preference; the configured default when absent.
    pub format: Option<OutputFormat>,
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub date: Option<String>,
    /// Maximum entries; `0` means unlimited.
    pub limit: Option<usize>,
    pub root: Option<PathBuf>,
}

pub struct SessionRetriever {
    settings: Settings,
}

impl SessionRetriever {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn root_for(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(absolutize)
            .unwrap_or_else(|| self.settings.root.clone())
    }

    /// Fetch one document. A missing document is [`Retrieval::NotFound`],
    /// not an error.
    pub async fn get(&self, request: GetRequest) -> Result<Retrieval> {
        let id = request.id.trim();
        if id.is_empty() {
            return Err(SessionError::InvalidInput(
                "Session identifier is required".to_string(),
            ));
        }
        let root = self.root_for(request.root.as_deref());
        let date = request
            .date
            .filter(|d| !d.trim().is_empty())
            .or_else(|| legacy_date(id))
            .unwrap_or_else(today_partition);
        let partition = root.join(&date);

        if layout::all_candidates(&partition, id)
            .iter()
            .any(|p| !validate_within_root(p, &root))
        {
            return Err(SessionError::FileRead {
                message: "Invalid file path detected".to_string(),
                cause: None,
            });
        }

        let Some((file, kind)) = layout::locate(&partition, id).await else {
            tracing::debug!(id, date = %date, "session not found");
            return Ok(Retrieval::NotFound {
                message: format!("Session not found: {} (date {})", id, date),
            });
        };

        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| SessionError::read("Failed to read session file", e))?;
        let parsed = parse_record(&text);

        let preference = request.format.unwrap_or(self.settings.output_format);
        let messages = parsed.messages.filter(|m| !m.is_empty());
        let (content, format) = match &messages {
            Some(messages) => encode(messages, preference)?,
            None => (parsed.body.into_value(), Encoding::Json),
        };

        Ok(Retrieval::Found(RetrievedSession {
            filename: id.to_string(),
            topic: parsed.topic.into_value(),
            date: match parsed.date {
                Fallback::Parsed(d) => d,
                Fallback::Default(_) => date,
            },
            file,
            layout: kind,
            content,
            messages,
            format,
        }))
    }

    /// Enumerate documents across partitions, newest first.
    pub async fn list(&self, request: ListRequest) -> Result<Vec<SessionInfo>> {
        let root = self.root_for(request.root.as_deref());
        let partitions = match request.date.filter(|d| !d.trim().is_empty()) {
            Some(date) => vec![date],
            None => layout::partitions(&root).await?,
        };

        let mut sessions = Vec::new();
        for date in partitions {
            let partition = root.join(&date);
            if !validate_within_root(&partition, &root) {
                return Err(SessionError::FileRead {
                    message: "Invalid file path detected".to_string(),
                    cause: None,
                });
            }
            for entry in layout::enumerate(&partition).await? {
                let size = tokio::fs::metadata(&entry.file)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                let topic = listing_topic(&entry.file, &entry.id).await;
                sessions.push(SessionInfo {
                    filename: entry.id,
                    topic,
                    date: date.clone(),
                    file: entry.file,
                    size,
                    layout: entry.layout,
                });
            }
        }

        sessions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.filename.cmp(&a.filename)));
        if let Some(limit) = request.limit.filter(|&l| l > 0) {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }
}

/// Topic for a listing entry: the parsed heading, or one derived from the
/// identifier when the file cannot be read or has no heading.
async fn listing_topic(file: &Path, id: &str) -> String {
    match tokio::fs::read_to_string(file).await {
        Ok(text) => match parse_record(&text).topic {
            Fallback::Parsed(topic) => topic,
            Fallback::Default(_) => topic_from_name(id),
        },
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "could not read session for listing");
            topic_from_name(id)
        }
    }
}

fn encode(messages: &[Message], preference: OutputFormat) -> Result<(String, Encoding)> {
    if preference != OutputFormat::Json {
        if let Some(toon) = encode_messages(messages) {
            return Ok((toon, Encoding::Toon));
        }
    }
    let json = serde_json::to_string_pretty(messages)
        .map_err(|e| SessionError::unknown("Failed to encode messages", e))?;
    Ok((json, Encoding::Json))
}

// ============ CLI output ============

pub async fn run_get(retriever: &SessionRetriever, request: GetRequest, json: bool) -> CliResult<()> {
    let retrieval = retriever.get(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&retrieval)?);
        return Ok(());
    }

    match retrieval {
        Retrieval::NotFound { message } => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
        Retrieval::Found(session) => {
            println!("--- Session ---");
            println!("filename: {}", session.filename);
            println!("topic:    {}", session.topic);
            println!("date:     {}", session.date);
            println!("file:     {}", session.file.display());
            println!("layout:   {}", session.layout);
            println!(
                "format:   {}",
                match session.format {
                    Encoding::Json => "json",
                    Encoding::Toon => "toon",
                }
            );
            println!();
            println!("{}", session.content);
        }
    }
    Ok(())
}

pub async fn run_list(retriever: &SessionRetriever, request: ListRequest, json: bool) -> CliResult<()> {
    let sessions = retriever.list(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for s in &sessions {
        let marker = match s.layout {
            LayoutKind::TopicFolder => "",
            LayoutKind::Legacy => " (legacy)",
        };
        println!("{}  {}  {}{}", s.date, s.filename, s.topic, marker);
    }
    println!();
    println!("{} session(s)", sessions.len());
    Ok(())
}
