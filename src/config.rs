use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::OutputFormat;
use crate::paths::{self, HARNESS_DIR, ROOT_ENV_VAR};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub secondary_root: Option<PathBuf>,
    #[serde(default)]
    pub mirror_to_project: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub default_limit: Option<usize>,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_snippets: default_max_snippets(),
            snippet_radius: default_snippet_radius(),
        }
    }
}

fn default_max_snippets() -> usize {
    3
}
fn default_snippet_radius() -> usize {
    150
}

impl Config {
    /// Configuration used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Resolve against the process environment. The root override and the
    /// workspace variables are read here and nowhere else.
    pub fn resolve(&self, cli_root: Option<&Path>) -> Result<Settings> {
        let env_root = std::env::var_os(ROOT_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let workspace = paths::workspace_dir(|name| std::env::var_os(name));
        self.resolve_with(cli_root, env_root.as_deref(), workspace.as_deref())
    }

    /// Resolve with an explicit environment override and workspace directory.
    /// Without a workspace the project copy starts from the working directory.
    pub fn resolve_with(
        &self,
        cli_root: Option<&Path>,
        env_root: Option<&Path>,
        workspace: Option<&Path>,
    ) -> Result<Settings> {
        let root = paths::resolve_root(cli_root, env_root, self.storage.root.as_deref());

        let secondary_root = match (&self.storage.secondary_root, self.storage.mirror_to_project) {
            (Some(dir), _) => Some(paths::absolutize(dir)),
            (None, true) => {
                let start = match workspace {
                    Some(dir) => dir.to_path_buf(),
                    None => std::env::current_dir().context("Failed to read working directory")?,
                };
                Some(
                    paths::detect_project_root(&start)
                        .join(HARNESS_DIR)
                        .join("sessions"),
                )
            }
            (None, false) => None,
        };

        let output_format = self.retrieval.format.parse::<OutputFormat>()?;

        Ok(Settings {
            root,
            secondary_root,
            output_format,
            search: SearchSettings {
                default_limit: self.search.default_limit,
                max_snippets: self.search.max_snippets,
                snippet_radius: self.search.snippet_radius,
            },
        })
    }
}

/// Configuration resolved once at startup and handed to the store,
/// retriever, and search engine.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub secondary_root: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub search: SearchSettings,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub default_limit: Option<usize>,
    pub max_snippets: usize,
    pub snippet_radius: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_snippets: default_max_snippets(),
            snippet_radius: default_snippet_radius(),
        }
    }
}

impl Settings {
    /// Defaults rooted at `root`, with no secondary destination.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: paths::absolutize(&root.into()),
            secondary_root: None,
            output_format: OutputFormat::Auto,
            search: SearchSettings::default(),
        }
    }
}

/// `~/.session-harness/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HARNESS_DIR)
        .join("config.toml")
}

/// Load an explicitly named config file, or the default one if it exists.
pub fn load_or_minimal(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config(&path)
            } else {
                Ok(Config::minimal())
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    match config.retrieval.format.as_str() {
        "json" | "toon" | "auto" => {}
        other => anyhow::bail!(
            "Unknown retrieval format: '{}'. Must be json, toon, or auto.",
            other
        ),
    }

    // Validate search
    if config.search.max_snippets == 0 {
        anyhow::bail!("search.max_snippets must be >= 1");
    }
    if config.search.default_limit == Some(0) {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    Ok(config)
}
