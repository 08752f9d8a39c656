//! Write path: validate, derive a topic, claim a topic folder, render and
//! write both document files.
//!
//! # Pipeline
//!
//! ```text
//! StoreRequest
//!   → validate (INVALID_INPUT)
//!   → extract_topic
//!   → root/<today>/ created            (DIRECTORY_CREATION_ERROR)
//!   → topic folder claimed             (FILENAME_GENERATION_ERROR)
//!   → summary.md + full.md rendered
//!   → paths validated, files written   (FILE_WRITE_ERROR)
//!   → optional secondary copy          (warning only)
//! ```
//!
//! A failure between the two file writes leaves the first file in place.
//! The error is still reported; callers should re-list before retrying.

use anyhow::Result as CliResult;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Result, SessionError};
use crate::format::{format_full_context, format_summary};
use crate::import::{load_export, messages_to_plain_text};
use crate::models::{Conversation, InputFormat, StoreOutcome};
use crate::naming::{claim_topic_folder, FULL_FILE, SUMMARY_FILE};
use crate::paths::{absolutize, validate_within_root};
use crate::topic::extract_topic;

/// Largest accepted conversation, measured on its JSON serialization.
pub const MAX_CONVERSATION_BYTES: usize = 10 * 1024 * 1024;

/// Longest accepted caller-provided topic, in characters.
pub const MAX_TOPIC_CHARS: usize = 100;

/// Where the conversation comes from.
#[derive(Debug, Clone)]
pub enum ConversationSource {
    Inline(Conversation),
    /// Path to a chat export file (see [`crate::import`]).
    Export(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub conversation: Option<ConversationSource>,
    pub topic: Option<String>,
    /// Declared input shape. Inline input defaults to `plain`, exports to `messages`.
    pub format: Option<InputFormat>,
    /// Overrides the configured primary root for this call.
    pub root: Option<PathBuf>,
    /// Overrides the configured secondary destination for this call.
    pub secondary_root: Option<PathBuf>,
}

impl StoreRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(ConversationSource::Inline(Conversation::Text(text.into()))),
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

pub struct SessionStore {
    settings: Settings,
}

#[derive(Debug)]
struct Written {
    summary: PathBuf,
    full: PathBuf,
}

impl SessionStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome> {
        if let Some(topic) = &request.topic {
            if topic.chars().count() > MAX_TOPIC_CHARS {
                return Err(SessionError::InvalidInput(format!(
                    "Topic must be {} characters or less",
                    MAX_TOPIC_CHARS
                )));
            }
        }
        let (conversation, format) = resolve_conversation(request.conversation, request.format).await?;

        let size = conversation.serialized_len();
        if size > MAX_CONVERSATION_BYTES {
            return Err(SessionError::InvalidInput(format!(
                "Conversation too large ({} bytes, max {} bytes)",
                size, MAX_CONVERSATION_BYTES
            )));
        }

        let mut warnings = Vec::new();
        if conversation.is_empty() {
            tracing::warn!("storing an empty conversation");
            warnings.push("Conversation is empty".to_string());
        }

        let topic = extract_topic(&conversation.topic_source(), request.topic.as_deref());
        let now = chrono::Local::now();
        let date = now.format("%Y-%m-%d").to_string();

        let summary = format_summary(&conversation, &topic, format, &date);
        let full = format_full_context(&conversation, &topic, format, &date);

        let root = request
            .root
            .as_deref()
            .map(absolutize)
            .unwrap_or_else(|| self.settings.root.clone());
        let partition = ensure_partition(&root, &date).await?;
        let folder = claim_topic_folder(&partition, &topic).await?;
        let primary = write_pair(&root, &partition.join(&folder), &summary, &full).await?;

        tracing::info!(
            folder = %folder,
            root = %root.display(),
            format = format.as_str(),
            "stored session"
        );

        let secondary_root = request
            .secondary_root
            .as_deref()
            .map(absolutize)
            .or_else(|| self.settings.secondary_root.clone())
            .filter(|dir| *dir != root);
        let mut secondary = None;
        if let Some(dir) = secondary_root {
            match copy_to_secondary(&dir, &date, &folder, &summary, &full).await {
                Ok(written) => secondary = Some(written),
                Err(e) => {
                    tracing::warn!(root = %dir.display(), error = %e, "secondary copy failed");
                    warnings.push(format!("Secondary copy to {} failed: {}", dir.display(), e));
                }
            }
        }

        Ok(StoreOutcome {
            success: true,
            summary_file: primary.summary,
            full_file: primary.full,
            message: format!(
                "Session saved in folder {}: {} and {}",
                folder, SUMMARY_FILE, FULL_FILE
            ),
            filename: folder,
            topic,
            date,
            created_at: now.to_rfc3339(),
            warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
            secondary_summary_file: secondary.as_ref().map(|w| w.summary.clone()),
            secondary_full_file: secondary.map(|w| w.full),
        })
    }
}

async fn resolve_conversation(
    source: Option<ConversationSource>,
    format: Option<InputFormat>,
) -> Result<(Conversation, InputFormat)> {
    match source {
        None => Err(SessionError::InvalidInput(
            "Conversation parameter is required".to_string(),
        )),
        Some(ConversationSource::Inline(conversation)) => {
            let format = format.unwrap_or_default();
            Ok((conversation.normalize(format)?, format))
        }
        Some(ConversationSource::Export(path)) => {
            let messages = load_export(&path).await?;
            match format.unwrap_or(InputFormat::Messages) {
                InputFormat::Messages => Ok((Conversation::Messages(messages), InputFormat::Messages)),
                InputFormat::Plain => Ok((
                    Conversation::Text(messages_to_plain_text(&messages)),
                    InputFormat::Plain,
                )),
            }
        }
    }
}

async fn ensure_partition(root: &Path, date: &str) -> Result<PathBuf> {
    let partition = root.join(date);
    tokio::fs::create_dir_all(&partition)
        .await
        .map_err(|e| SessionError::directory("Failed to create date directory", e))?;
    Ok(partition)
}

/// Validate and write `summary.md` then `full.md` inside `folder`.
async fn write_pair(root: &Path, folder: &Path, summary: &str, full: &str) -> Result<Written> {
    let summary_path = folder.join(SUMMARY_FILE);
    let full_path = folder.join(FULL_FILE);
    if !validate_within_root(&summary_path, root) || !validate_within_root(&full_path, root) {
        return Err(SessionError::FileWrite {
            message: "Invalid file path detected".to_string(),
            cause: None,
        });
    }

    tokio::fs::write(&summary_path, summary)
        .await
        .map_err(|e| SessionError::write("Failed to write session files", e))?;
    tokio::fs::write(&full_path, full)
        .await
        .map_err(|e| SessionError::write("Failed to write session files", e))?;

    Ok(Written {
        summary: summary_path,
        full: full_path,
    })
}

/// Repeat the write under `root` with the folder name chosen for the primary
/// root. An existing document there is left untouched.
async fn copy_to_secondary(
    root: &Path,
    date: &str,
    folder: &str,
    summary: &str,
    full: &str,
) -> Result<Written> {
    let dir = ensure_partition(root, date).await?.join(folder);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| SessionError::directory("Failed to create topic directory", e))?;
    for name in [SUMMARY_FILE, FULL_FILE] {
        if tokio::fs::try_exists(dir.join(name)).await.unwrap_or(true) {
            return Err(SessionError::FileWrite {
                message: format!("{} already holds a document", dir.display()),
                cause: None,
            });
        }
    }
    write_pair(root, &dir, summary, full).await
}

// ============ CLI output ============

pub async fn run_store(store: &SessionStore, request: StoreRequest, json: bool) -> CliResult<()> {
    let outcome = store.store(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", outcome.message);
    println!("  id:      {}", outcome.filename);
    println!("  topic:   {}", outcome.topic);
    println!("  date:    {}", outcome.date);
    println!("  summary: {}", outcome.summary_file.display());
    println!("  full:    {}", outcome.full_file.display());
    if let Some(copy) = &outcome.secondary_full_file {
        println!("  copy:    {}", copy.display());
    }
    if let Some(warning) = &outcome.warning {
        eprintln!("Warning: {}", warning);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::naming::MAX_COLLISION_ATTEMPTS;
    use crate::paths::today_partition;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> SessionStore {
        SessionStore::new(Settings::with_root(tmp.path()))
    }

    #[tokio::test]
    async fn test_store_writes_both_files() {
        let tmp = TempDir::new().unwrap();
        let outcome = store_in(&tmp)
            .store(StoreRequest::text("User: implement auth\nAI: sure"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.topic, "implement-auth");
        assert_eq!(outcome.filename, "implement-auth");
        assert!(outcome.summary_file.ends_with("implement-auth/summary.md"));
        assert!(outcome.full_file.ends_with("implement-auth/full.md"));
        assert!(outcome.summary_file.starts_with(tmp.path().join(&outcome.date)));
        assert!(outcome.warning.is_none());

        let full = std::fs::read_to_string(&outcome.full_file).unwrap();
        assert!(full.contains("## Full Conversation (JSON)"));
    }

    #[tokio::test]
    async fn test_missing_conversation_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = store_in(&tmp).store(StoreRequest::default()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("required"));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_long_topic_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = store_in(&tmp)
            .store(StoreRequest::text("hello").with_topic("t".repeat(101)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_oversized_conversation_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = store_in(&tmp)
            .store(StoreRequest::text("x".repeat(MAX_CONVERSATION_BYTES + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_empty_conversation_warns() {
        let tmp = TempDir::new().unwrap();
        let outcome = store_in(&tmp)
            .store(StoreRequest::text("").with_topic("empty"))
            .await
            .unwrap();
        assert_eq!(outcome.warning.as_deref(), Some("Conversation is empty"));
    }

    #[tokio::test]
    async fn test_root_under_file_is_directory_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("plain-file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = SessionStore::new(Settings::with_root(&blocker))
            .store(StoreRequest::text("hello there").with_topic("blocked"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DIRECTORY_CREATION_ERROR");
        assert!(err.to_string().contains("Failed to create date directory"));
        assert!(err.details().is_some());
    }

    #[tokio::test]
    async fn test_folder_name_attempts_exhausted() {
        let tmp = TempDir::new().unwrap();
        let partition = tmp.path().join(today_partition());
        for attempt in 0..MAX_COLLISION_ATTEMPTS {
            let name = if attempt == 0 {
                "cap".to_string()
            } else {
                format!("cap-{}", attempt)
            };
            let dir = partition.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(FULL_FILE), "taken").unwrap();
        }

        let err = store_in(&tmp)
            .store(StoreRequest::text("one more").with_topic("cap"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FILENAME_GENERATION_ERROR");
        assert!(!partition.join(format!("cap-{}", MAX_COLLISION_ATTEMPTS)).exists());
    }

    #[tokio::test]
    async fn test_failed_full_write_keeps_summary() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("2025-01-02").join("half");
        // a directory where full.md should go makes the second write fail
        std::fs::create_dir_all(folder.join(FULL_FILE)).unwrap();

        let err = write_pair(tmp.path(), &folder, "summary text", "full text")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FILE_WRITE_ERROR");
        assert!(err.to_string().contains("Failed to write session files"));
        assert_eq!(
            std::fs::read_to_string(folder.join(SUMMARY_FILE)).unwrap(),
            "summary text"
        );
    }

    #[tokio::test]
    async fn test_write_outside_root_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let outside = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&outside).unwrap();

        let err = write_pair(&root, &outside, "s", "f").await.unwrap_err();
        assert_eq!(err.code(), "FILE_WRITE_ERROR");
        assert!(!outside.join(SUMMARY_FILE).exists());
    }

    #[tokio::test]
    async fn test_messages_format_validates_json_text() {
        let tmp = TempDir::new().unwrap();
        let request = StoreRequest {
            format: Some(InputFormat::Messages),
            ..StoreRequest::text(r#"{"not": "a list"}"#)
        };
        let err = store_in(&tmp).store(request).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());

        let request = StoreRequest {
            format: Some(InputFormat::Messages),
            ..StoreRequest::text(r#"[{"role": "user", "content": "ship the release"}]"#)
        };
        let outcome = store_in(&tmp).store(request).await.unwrap();
        let full = std::fs::read_to_string(&outcome.full_file).unwrap();
        assert!(full.contains("**USER:**"));
    }

    #[tokio::test]
    async fn test_collision_gets_suffix() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let first = store
            .store(StoreRequest::text("a").with_topic("collision-test"))
            .await
            .unwrap();
        let second = store
            .store(StoreRequest::text("b").with_topic("collision-test"))
            .await
            .unwrap();
        assert_eq!(first.filename, "collision-test");
        assert_eq!(second.filename, "collision-test-1");
    }

    #[tokio::test]
    async fn test_secondary_copy_uses_same_folder() {
        let tmp = TempDir::new().unwrap();
        let primary = tmp.path().join("primary");
        let secondary = tmp.path().join("secondary");
        let store = SessionStore::new(Settings::with_root(&primary));

        let request = StoreRequest {
            conversation: Some(ConversationSource::Inline(Conversation::Messages(vec![
                Message::new("user", "deploy the service"),
            ]))),
            topic: Some("deploy".to_string()),
            format: Some(InputFormat::Messages),
            root: None,
            secondary_root: Some(secondary.clone()),
        };
        let outcome = store.store(request).await.unwrap();

        let copy = outcome.secondary_full_file.unwrap();
        assert!(copy.starts_with(&secondary));
        assert!(copy.ends_with("deploy/full.md"));
        assert_eq!(
            std::fs::read_to_string(&copy).unwrap(),
            std::fs::read_to_string(&outcome.full_file).unwrap()
        );
    }

    #[tokio::test]
    async fn test_secondary_failure_is_warning() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let mut settings = Settings::with_root(tmp.path().join("primary"));
        settings.secondary_root = Some(blocker);
        let outcome = SessionStore::new(settings)
            .store(StoreRequest::text("hello world there").with_topic("warned"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.full_file.exists());
        assert!(outcome.warning.unwrap().contains("Secondary copy"));
        assert!(outcome.secondary_full_file.is_none());
    }

    #[tokio::test]
    async fn test_import_export_file() {
        let tmp = TempDir::new().unwrap();
        let export = tmp.path().join("chat.md");
        std::fs::write(&export, "**User**\n\nHow do I add caching?\n\n**Assistant**\n\nUse a map.\n").unwrap();

        let request = StoreRequest {
            conversation: Some(ConversationSource::Export(export)),
            ..StoreRequest::default()
        };
        let outcome = SessionStore::new(Settings::with_root(tmp.path().join("root")))
            .store(request)
            .await
            .unwrap();

        let full = std::fs::read_to_string(&outcome.full_file).unwrap();
        assert!(full.contains("**Format:** messages"));
        assert!(full.contains("\"content\": \"Use a map.\""));
    }
}
