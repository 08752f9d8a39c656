//! On-disk layouts a document may be stored under.
//!
//! Two layouts coexist inside a date partition:
//!
//! ```text
//! root/2025-03-04/
//! ├── implement-auth/            ← topic folder (current, written by the store)
//! │   ├── summary.md
//! │   └── full.md
//! ├── session-20250304-101500-deploy-full.md      ← legacy flat files
//! ├── session-20250304-101500-deploy-summary.md   ← (read-only)
//! └── notes.md
//! ```
//!
//! Each layout is a [`Layout`] strategy. Callers never branch on the layout
//! themselves; they go through [`locate`] and [`enumerate`], which check the
//! strategies in [`LAYOUTS`] order.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};
use crate::models::LayoutKind;
use crate::naming::{FULL_FILE, SUMMARY_FILE};

const LEGACY_FULL_SUFFIX: &str = "-full";
const LEGACY_SUMMARY_SUFFIX: &str = "-summary";
const MARKDOWN_EXT: &str = ".md";

/// One document found while enumerating a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    /// Identifier accepted by `get`: the topic folder name or the legacy base name.
    pub id: String,
    /// Preferred file of the document (full record when present).
    pub file: PathBuf,
    pub layout: LayoutKind,
}

/// A strategy for finding documents inside one date partition.
#[async_trait]
pub trait Layout: Send + Sync {
    fn kind(&self) -> LayoutKind;

    /// Candidate file paths for `id`, in preference order. Paths are not
    /// checked for existence here.
    fn candidates(&self, partition: &Path, id: &str) -> Vec<PathBuf>;

    /// Every document stored under this layout in `partition`.
    async fn enumerate(&self, partition: &Path) -> Result<Vec<LayoutEntry>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Topic folder layout
// ═══════════════════════════════════════════════════════════════════════

/// `partition/<folder>/{full.md, summary.md}`.
///
/// The identifier is the folder name, optionally followed by a path-style
/// suffix naming one of the two files (`implement-auth/summary.md`).
pub struct TopicFolderLayout;

#[async_trait]
impl Layout for TopicFolderLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::TopicFolder
    }

    fn candidates(&self, partition: &Path, id: &str) -> Vec<PathBuf> {
        let (folder, file) = match id.split_once('/') {
            Some((folder, file)) => (folder, Some(file)),
            None => (id, None),
        };
        let dir = partition.join(folder);
        let mut out = Vec::with_capacity(3);
        if let Some(file) = file.filter(|f| *f == FULL_FILE || *f == SUMMARY_FILE) {
            out.push(dir.join(file));
        }
        out.push(dir.join(FULL_FILE));
        out.push(dir.join(SUMMARY_FILE));
        out
    }

    async fn enumerate(&self, partition: &Path) -> Result<Vec<LayoutEntry>> {
        let mut entries = Vec::new();
        for (name, path) in read_partition(partition).await? {
            if !is_dir(&path).await {
                continue;
            }
            let full = path.join(FULL_FILE);
            let summary = path.join(SUMMARY_FILE);
            let file = if is_file(&full).await {
                full
            } else if is_file(&summary).await {
                summary
            } else {
                continue;
            };
            entries.push(LayoutEntry {
                id: name,
                file,
                layout: LayoutKind::TopicFolder,
            });
        }
        Ok(entries)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Legacy flat-file layout
// ═══════════════════════════════════════════════════════════════════════

/// `partition/<base>-full.md`, `partition/<base>-summary.md` or a bare
/// `partition/<base>.md`. Never written anymore.
pub struct FlatFileLayout;

/// Strip `.md` and one of the legacy role suffixes.
fn legacy_base(id: &str) -> &str {
    let stem = id.strip_suffix(MARKDOWN_EXT).unwrap_or(id);
    stem.strip_suffix(LEGACY_FULL_SUFFIX)
        .or_else(|| stem.strip_suffix(LEGACY_SUMMARY_SUFFIX))
        .unwrap_or(stem)
}

#[async_trait]
impl Layout for FlatFileLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Legacy
    }

    fn candidates(&self, partition: &Path, id: &str) -> Vec<PathBuf> {
        let base = legacy_base(id);
        let mut out = Vec::with_capacity(4);
        if id.ends_with(MARKDOWN_EXT) {
            out.push(partition.join(id));
        }
        out.push(partition.join(format!("{}{}{}", base, LEGACY_FULL_SUFFIX, MARKDOWN_EXT)));
        out.push(partition.join(format!("{}{}{}", base, LEGACY_SUMMARY_SUFFIX, MARKDOWN_EXT)));
        out.push(partition.join(format!("{}{}", base, MARKDOWN_EXT)));
        out
    }

    async fn enumerate(&self, partition: &Path) -> Result<Vec<LayoutEntry>> {
        // base name -> (rank, file); lower rank is preferred
        let mut grouped: BTreeMap<String, (u8, PathBuf)> = BTreeMap::new();
        for (name, path) in read_partition(partition).await? {
            if !name.ends_with(MARKDOWN_EXT) || !is_file(&path).await {
                continue;
            }
            let stem = &name[..name.len() - MARKDOWN_EXT.len()];
            let rank = if stem.ends_with(LEGACY_FULL_SUFFIX) {
                0
            } else if stem.ends_with(LEGACY_SUMMARY_SUFFIX) {
                1
            } else {
                2
            };
            let base = legacy_base(&name).to_string();
            match grouped.get(&base) {
                Some((existing, _)) if *existing <= rank => {}
                _ => {
                    grouped.insert(base, (rank, path));
                }
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(id, (_, file))| LayoutEntry {
                id,
                file,
                layout: LayoutKind::Legacy,
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Probing
// ═══════════════════════════════════════════════════════════════════════

/// Layouts in lookup order.
pub static LAYOUTS: [&dyn Layout; 2] = [&TopicFolderLayout, &FlatFileLayout];

/// Find the file for `id` in `partition`, trying each layout in order.
pub async fn locate(partition: &Path, id: &str) -> Option<(PathBuf, LayoutKind)> {
    for layout in LAYOUTS {
        for candidate in layout.candidates(partition, id) {
            if is_file(&candidate).await {
                tracing::debug!(id, layout = %layout.kind(), file = %candidate.display(), "located document");
                return Some((candidate, layout.kind()));
            }
        }
    }
    None
}

/// Every candidate path any layout could produce for `id`. Used for path
/// validation before probing.
pub fn all_candidates(partition: &Path, id: &str) -> Vec<PathBuf> {
    LAYOUTS
        .iter()
        .flat_map(|layout| layout.candidates(partition, id))
        .collect()
}

/// Merge the documents of all layouts in `partition`. A topic folder hides a
/// legacy document with the same identifier.
pub async fn enumerate(partition: &Path) -> Result<Vec<LayoutEntry>> {
    let mut merged: Vec<LayoutEntry> = Vec::new();
    for layout in LAYOUTS {
        for entry in layout.enumerate(partition).await? {
            if !merged.iter().any(|e| e.id == entry.id) {
                merged.push(entry);
            }
        }
    }
    Ok(merged)
}

/// Date partitions under `root`, newest first. A missing root has none.
pub async fn partitions(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for (name, path) in read_partition(root).await? {
        if is_dir(&path).await {
            names.push(name);
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Directory listing as `(name, path)` pairs. Missing directories are empty.
async fn read_partition(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SessionError::read(
                &format!("Failed to read directory {}", dir.display()),
                e,
            ))
        }
    };
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| {
        SessionError::read(&format!("Failed to read directory {}", dir.display()), e)
    })? {
        if let Some(name) = entry.file_name().to_str() {
            out.push((name.to_string(), entry.path()));
        }
    }
    Ok(out)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "# x\n").unwrap();
    }

    #[test]
    fn test_legacy_base() {
        assert_eq!(legacy_base("session-20240101-000000-a-full.md"), "session-20240101-000000-a");
        assert_eq!(legacy_base("notes-summary"), "notes");
        assert_eq!(legacy_base("notes.md"), "notes");
        assert_eq!(legacy_base("notes"), "notes");
    }

    #[tokio::test]
    async fn test_locate_prefers_full_in_topic_folder() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("auth").join(SUMMARY_FILE));
        touch(&tmp.path().join("auth").join(FULL_FILE));

        let (file, kind) = locate(tmp.path(), "auth").await.unwrap();
        assert_eq!(kind, LayoutKind::TopicFolder);
        assert!(file.ends_with("auth/full.md"));

        let (file, _) = locate(tmp.path(), "auth/summary.md").await.unwrap();
        assert!(file.ends_with("auth/summary.md"));
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_summary() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("half").join(SUMMARY_FILE));
        let (file, _) = locate(tmp.path(), "half").await.unwrap();
        assert!(file.ends_with("half/summary.md"));
    }

    #[tokio::test]
    async fn test_locate_legacy_variants() {
        let tmp = TempDir::new().unwrap();
        let base = "session-20240315-101500-deploy";
        touch(&tmp.path().join(format!("{}-summary.md", base)));
        touch(&tmp.path().join("bare.md"));

        let (file, kind) = locate(tmp.path(), base).await.unwrap();
        assert_eq!(kind, LayoutKind::Legacy);
        assert!(file.ends_with(format!("{}-summary.md", base)));

        let (file, _) = locate(tmp.path(), &format!("{}-full", base)).await.unwrap();
        assert!(file.ends_with(format!("{}-summary.md", base)));

        let (file, _) = locate(tmp.path(), "bare.md").await.unwrap();
        assert!(file.ends_with("bare.md"));

        assert!(locate(tmp.path(), "missing").await.is_none());
    }

    #[tokio::test]
    async fn test_enumerate_merges_layouts() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("auth").join(FULL_FILE));
        std::fs::create_dir_all(tmp.path().join("empty-shell")).unwrap();
        touch(&tmp.path().join("old-full.md"));
        touch(&tmp.path().join("old-summary.md"));
        touch(&tmp.path().join("notes.md"));
        std::fs::write(tmp.path().join("readme.txt"), "x").unwrap();

        let mut entries = enumerate(tmp.path()).await.unwrap();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["auth", "notes", "old"]);
        assert!(entries[2].file.ends_with("old-full.md"));
        assert_eq!(entries[0].layout, LayoutKind::TopicFolder);
        assert_eq!(entries[1].layout, LayoutKind::Legacy);
    }

    #[tokio::test]
    async fn test_partitions_newest_first() {
        let tmp = TempDir::new().unwrap();
        for d in ["2024-01-01", "2025-06-30", "2025-01-15"] {
            std::fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        std::fs::write(tmp.path().join("stray.md"), "x").unwrap();
        assert_eq!(
            partitions(tmp.path()).await.unwrap(),
            vec!["2025-06-30", "2025-01-15", "2024-01-01"]
        );
        assert!(partitions(&tmp.path().join("nope")).await.unwrap().is_empty());
    }
}
