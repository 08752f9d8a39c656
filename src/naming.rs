//! Topic slugs and collision-free topic folder names.
//!
//! Slugs are deterministic, so storing the same topic twice on one day
//! collides by design. Collisions are resolved with an increasing numeric
//! suffix (`-1`, `-2`, ...). Existing folders are never renamed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Result, SessionError};

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

/// Collision suffixes tried before giving up.
pub const MAX_COLLISION_ATTEMPTS: usize = 1000;

/// Summary file inside a topic folder.
pub const SUMMARY_FILE: &str = "summary.md";

/// Full-record file inside a topic folder.
pub const FULL_FILE: &str = "full.md";

/// Trailing suffixes that add nothing to a folder name. At most one is removed.
const REDUNDANT_SUFFIXES: &[&str] = &["-summary", "-session", "-conversation", "-chat"];

static LEGACY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"session-(\d{4})(\d{2})(\d{2})-").expect("valid regex"));

/// Convert free text into a URL-safe slug.
///
/// Lowercases, keeps only `[a-z0-9 -]`, turns whitespace runs into single
/// hyphens, collapses repeated hyphens, trims hyphens at both ends and
/// truncates to [`MAX_SLUG_LEN`] characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let truncated: String = slug
        .trim_matches('-')
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();
    truncated.trim_end_matches('-').to_string()
}

/// Slug for a topic folder, with one redundant suffix removed.
pub fn base_folder_name(topic: &str) -> String {
    let slug = slugify(topic);
    let stripped = REDUNDANT_SUFFIXES
        .iter()
        .find_map(|suffix| slug.strip_suffix(suffix))
        .unwrap_or(&slug);
    if stripped.is_empty() {
        "session".to_string()
    } else {
        stripped.to_string()
    }
}

/// Folder names tried for `base`, in order: `base`, `base-1`, ... up to
/// [`MAX_COLLISION_ATTEMPTS`] names in total.
fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    (0..MAX_COLLISION_ATTEMPTS).map(move |attempt| {
        if attempt == 0 {
            base.to_string()
        } else {
            format!("{}-{}", base, attempt)
        }
    })
}

#[derive(Debug, PartialEq, Eq)]
enum FolderState {
    Available,
    /// Exists but holds neither document file.
    Reusable,
    Occupied,
}

async fn folder_state(path: &Path) -> Result<FolderState> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FolderState::Available),
        Err(e) => {
            return Err(SessionError::FilenameGeneration {
                message: format!("Failed to inspect {}", path.display()),
                cause: e.to_string(),
            })
        }
    };
    if !meta.is_dir() {
        return Ok(FolderState::Occupied);
    }
    let has_summary = tokio::fs::try_exists(path.join(SUMMARY_FILE))
        .await
        .unwrap_or(true);
    let has_full = tokio::fs::try_exists(path.join(FULL_FILE))
        .await
        .unwrap_or(true);
    if has_summary || has_full {
        Ok(FolderState::Occupied)
    } else {
        Ok(FolderState::Reusable)
    }
}

fn exhausted(base: &str) -> SessionError {
    SessionError::FilenameGeneration {
        message: "Failed to generate topic folder name".to_string(),
        cause: format!(
            "{} folders named '{}' already exist in this partition",
            MAX_COLLISION_ATTEMPTS, base
        ),
    }
}

/// Read-only form of [`claim_topic_folder`]: the name a store under
/// `root/date` would receive now, without creating anything.
pub async fn topic_folder_name(date: &str, topic: &str, root: &Path) -> Result<String> {
    let base = base_folder_name(topic);
    let partition = root.join(date);
    for name in candidates(&base) {
        if folder_state(&partition.join(&name)).await? != FolderState::Occupied {
            return Ok(name);
        }
    }
    Err(exhausted(&base))
}

/// Create a fresh topic folder under `partition` and return its name.
///
/// Each candidate is claimed with a non-recursive `create_dir`, so two
/// concurrent writers cannot both receive the same newly created folder. A
/// candidate that already exists is accepted only if it is an empty shell.
pub async fn claim_topic_folder(partition: &Path, topic: &str) -> Result<String> {
    let base = base_folder_name(topic);
    for name in candidates(&base) {
        let path = partition.join(&name);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => return Ok(name),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if folder_state(&path).await? == FolderState::Reusable {
                    tracing::debug!(folder = %name, "reusing empty topic folder");
                    return Ok(name);
                }
            }
            Err(e) => return Err(SessionError::directory("Failed to create topic directory", e)),
        }
    }
    Err(exhausted(&base))
}

/// Date partition encoded in a legacy file name (`session-YYYYMMDD-...`).
pub fn legacy_date(name: &str) -> Option<String> {
    LEGACY_DATE
        .captures(name)
        .map(|c| format!("{}-{}-{}", &c[1], &c[2], &c[3]))
}

/// Display topic recovered from a document identifier when its file cannot
/// be read.
pub fn topic_from_name(name: &str) -> String {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    if stem.starts_with("session-") {
        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() > 3 {
            return parts[3..].join(" ");
        }
        return "Untitled".to_string();
    }
    stem.replace('-', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World! @#$%"), "hello-world");
        assert_eq!(slugify("  Multiple   Spaces---Here  "), "multiple-spaces-here");
        assert_eq!(slugify("implement auth"), "implement-auth");
    }

    #[test]
    fn test_slugify_properties() {
        let inputs = [
            "",
            "---",
            "Ünïcödé títle",
            "a very long topic that keeps going and going well beyond fifty characters",
            "exactly-fifty-characters-long-slug-with-dash-at-4-x",
            "tabs\tand\nnewlines",
            "  -leading and trailing-  ",
            "C++ / Rust? 100%",
        ];
        for input in inputs {
            let slug = slugify(input);
            assert_eq!(slugify(&slug), slug, "not idempotent for {:?}", input);
            assert!(slug.len() <= MAX_SLUG_LEN);
            assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn test_slugify_truncation_drops_dangling_hyphen() {
        let input = format!("{} tail", "a".repeat(49));
        let slug = slugify(&input);
        assert_eq!(slug, "a".repeat(49));
    }

    #[test]
    fn test_base_folder_name_strips_one_suffix() {
        assert_eq!(base_folder_name("test-session-summary"), "test-session");
        assert_eq!(base_folder_name("Auth chat"), "auth");
        assert_eq!(base_folder_name("deploy-conversation"), "deploy");
        assert_eq!(base_folder_name("plain"), "plain");
    }

    #[tokio::test]
    async fn test_topic_folder_name_free() {
        let tmp = TempDir::new().unwrap();
        let name = topic_folder_name("2025-01-02", "test-topic", tmp.path())
            .await
            .unwrap();
        assert_eq!(name, "test-topic");
    }

    #[tokio::test]
    async fn test_topic_folder_name_collision() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("2025-01-02").join("collision-test");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::write(first.join(SUMMARY_FILE), "x").unwrap();
        std::fs::write(first.join(FULL_FILE), "x").unwrap();

        let name = topic_folder_name("2025-01-02", "collision-test", tmp.path())
            .await
            .unwrap();
        assert_eq!(name, "collision-test-1");
    }

    #[tokio::test]
    async fn test_topic_folder_name_reuses_empty_shell() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("2025-01-02").join("shell")).unwrap();
        let name = topic_folder_name("2025-01-02", "shell", tmp.path())
            .await
            .unwrap();
        assert_eq!(name, "shell");
    }

    #[tokio::test]
    async fn test_claim_topic_folder_increments() {
        let tmp = TempDir::new().unwrap();
        let partition = tmp.path();

        let first = claim_topic_folder(partition, "repeat").await.unwrap();
        std::fs::write(partition.join(&first).join(FULL_FILE), "x").unwrap();
        let second = claim_topic_folder(partition, "repeat").await.unwrap();
        std::fs::write(partition.join(&second).join(SUMMARY_FILE), "x").unwrap();
        let third = claim_topic_folder(partition, "repeat").await.unwrap();

        assert_eq!(first, "repeat");
        assert_eq!(second, "repeat-1");
        assert_eq!(third, "repeat-2");
    }

    #[test]
    fn test_candidates_stop_at_attempt_cap() {
        let names: Vec<String> = candidates("cap").collect();
        assert_eq!(names.len(), MAX_COLLISION_ATTEMPTS);
        assert_eq!(names[0], "cap");
        assert_eq!(names[1], "cap-1");
        assert_eq!(names.last().map(String::as_str), Some("cap-999"));
    }

    #[tokio::test]
    async fn test_query_and_claim_agree() {
        let tmp = TempDir::new().unwrap();
        let partition = tmp.path().join("2025-01-02");
        let taken = partition.join("agree");
        std::fs::create_dir_all(&taken).unwrap();
        std::fs::write(taken.join(FULL_FILE), "x").unwrap();

        let predicted = topic_folder_name("2025-01-02", "agree", tmp.path())
            .await
            .unwrap();
        let claimed = claim_topic_folder(&partition, "agree").await.unwrap();
        assert_eq!(predicted, "agree-1");
        assert_eq!(claimed, predicted);
    }

    #[test]
    fn test_legacy_date() {
        assert_eq!(
            legacy_date("session-20240315-101500-auth-flow-full.md").as_deref(),
            Some("2024-03-15")
        );
        assert_eq!(legacy_date("auth-flow"), None);
    }

    #[test]
    fn test_topic_from_name() {
        assert_eq!(
            topic_from_name("session-20240315-101500-auth-flow.md"),
            "auth flow"
        );
        assert_eq!(topic_from_name("session-2024"), "Untitled");
        assert_eq!(topic_from_name("collision-test-1"), "collision test 1");
    }
}
