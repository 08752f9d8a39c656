//! Storage root resolution and path validation.
//!
//! Every read and write goes through [`validate_within_root`] before touching
//! the filesystem. Validation is lexical: paths are made absolute and
//! normalized without following symlinks.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the storage root.
pub const ROOT_ENV_VAR: &str = "SESSION_HARNESS_DIR";

/// Directory (under the user's home or a project root) holding harness data.
pub const HARNESS_DIR: &str = ".session-harness";

/// Files and directories that mark a project root.
const PROJECT_MARKERS: &[&str] = &[
    "package.json",
    ".git",
    HARNESS_DIR,
    "Cargo.toml",
    "go.mod",
    "requirements.txt",
    "pom.xml",
    "project.json",
];

/// Variables naming the editor workspace, checked in order.
pub const WORKSPACE_ENV_VARS: &[&str] = &[
    "VSCODE_CWD",
    "CURSOR_CWD",
    "WORKSPACE_FOLDER",
    "PROJECT_ROOT",
    "PWD",
];

/// First non-empty workspace variable, as an absolute path.
pub fn workspace_dir<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    WORKSPACE_ENV_VARS
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.is_empty())
        .map(|value| absolutize(Path::new(&value)))
}

/// Fixed per-user default root: `~/.session-harness/sessions`.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HARNESS_DIR)
        .join("sessions")
}

/// Resolve the storage root.
///
/// Precedence: explicit override, then the environment override, then the
/// value from the configuration file, then [`default_root`].
pub fn resolve_root(
    explicit: Option<&Path>,
    env_override: Option<&Path>,
    configured: Option<&Path>,
) -> PathBuf {
    explicit
        .or(env_override)
        .or(configured)
        .map(absolutize)
        .unwrap_or_else(|| absolutize(&default_root()))
}

/// True only if `path` lies lexically under `root` and contains no `..`
/// segment.
pub fn validate_within_root(path: &Path, root: &Path) -> bool {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    let path = absolutize(path);
    let root = absolutize(root);
    path.starts_with(&root)
}

/// Make a path absolute against the working directory and normalize `.` and
/// `..` segments lexically.
pub fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize(&absolute)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Walk up from `start` looking for a project marker. Falls back to `start`.
///
/// Only used to derive the optional project-copy destination; reads and
/// searches never depend on it.
pub fn detect_project_root(start: &Path) -> PathBuf {
    let start = absolutize(start);
    let mut current = Some(start.as_path());
    while let Some(dir) = current {
        if PROJECT_MARKERS.iter().any(|m| dir.join(m).exists()) {
            return dir.to_path_buf();
        }
        current = dir.parent();
    }
    start
}

/// Today's date partition name in local time (`YYYY-MM-DD`).
pub fn today_partition() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
