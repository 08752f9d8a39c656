//! # Session Harness
//!
//! A local-first store for AI conversation transcripts.
//!
//! Conversations are written as Markdown files under a per-day partition,
//! one topic folder per conversation, and can be read back, listed, and
//! searched. Each stored conversation has a short summary page and a full
//! record that embeds the messages as a fenced JSON block.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────────────────┐
//! │  store   │──▶│ topic/naming │──▶│ root/YYYY-MM-DD/<topic>/     │
//! │          │   │    format    │   │   summary.md  full.md       │
//! └──────────┘   └──────────────┘   └──────────────┬──────────────┘
//!                                                  │
//!                         ┌─────── layout ─────────┤
//!                         ▼                        ▼
//!                   ┌──────────┐             ┌──────────┐
//!                   │ get/list │             │  search  │
//!                   │ (parser) │             │ (parser) │
//!                   └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! echo "User: implement auth" | sessions store
//! sessions list --limit 5
//! sessions get implement-auth
//! sessions search "authentication" --from 2025-01-01
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and resolved settings |
//! | [`error`] | Error taxonomy and codes |
//! | [`models`] | Core data types |
//! | [`paths`] | Storage root resolution and path validation |
//! | [`naming`] | Slugs and collision-free topic folders |
//! | [`topic`] | Heuristic topic extraction |
//! | [`format`] | Summary and full-record rendering |
//! | [`parser`] | Reading stored documents back |
//! | [`layout`] | Current and legacy on-disk layouts |
//! | [`toon`] | Compact TOON encoding for retrieval output |
//! | [`import`] | Chat export parsing |
//! | [`store`] | Write path |
//! | [`get`] | Retrieval and listing |
//! | [`search`] | Scored corpus search |

pub mod config;
pub mod error;
pub mod format;
pub mod get;
pub mod import;
pub mod layout;
pub mod models;
pub mod naming;
pub mod parser;
pub mod paths;
pub mod search;
pub mod store;
pub mod topic;
pub mod toon;

pub use config::{Config, Settings};
pub use error::{Result, SessionError};
pub use get::{GetRequest, ListRequest, SessionRetriever};
pub use search::{SearchRequest, SessionSearch};
pub use store::{ConversationSource, SessionStore, StoreRequest};
