//! GitHub-backed content storage for obsidian-log.
//!
//! Site content lives as files in a GitHub repository. This crate provides:
//!
//! - [`GitHubClient`]: the Contents API (list, read, SHA lookup, put, delete)
//! - [`VersionedStore`]: a file store with per-file version tokens, with
//!   [`GitHubStore`] and the in-memory [`MemoryStore`] as implementations
//! - [`write_with_retry`]: optimistic-concurrency writes that re-read the
//!   version and retry when another commit got there first
//! - [`SiteConfigService`]: the site configuration document and its
//!   administrator list
//!
//! # Example
//!
//! ```
//! use obsidian_log_auth::User;
//! use obsidian_log_content::{ConfigUpdate, MemoryStore, RepoRef, SiteConfigService};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! store.insert(".obsidian-log/config.json", r#"{"admins": ["octocat"]}"#);
//!
//! let service = SiteConfigService::new(store, RepoRef::new("octocat", "blog"));
//! let actor = User::new("uid_1").with_github_username(Some("octocat".to_string()));
//!
//! let update = ConfigUpdate {
//!     admins: vec!["octocat".to_string(), "hubot".to_string()],
//!     ..ConfigUpdate::default()
//! };
//! let config = service.publish(update, &actor).await.unwrap();
//! assert_eq!(config.github_repo_url, "https://github.com/octocat/blog");
//! # }
//! ```

pub mod error;
pub mod github;
pub mod repo;
pub mod site_config;
pub mod store;

pub use error::{ContentError, GitHubError, StoreError, is_version_conflict};
pub use github::{DirectoryEntry, GITHUB_API, GitHubClient, GitHubStore};
pub use repo::{RepoRef, is_valid_repo_url};
pub use site_config::{AppConfig, CONFIG_PATH, CONFIG_PATHS, ConfigUpdate, SiteConfigService};
pub use store::{
    DEFAULT_WRITE_ATTEMPTS, FileContent, MemoryStore, VersionedStore, WriteRequest,
    write_with_retry,
};
