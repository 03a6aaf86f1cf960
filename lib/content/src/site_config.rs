//! The site configuration document, `.obsidian-log/config.json`.
//!
//! It names the content repository, the Zenn account, the site's headings
//! and, most importantly, the GitHub usernames allowed to administer the
//! site. Reads are lenient; writes go through the SHA-retry writer.

use crate::error::ContentError;
use crate::repo::{RepoRef, is_valid_repo_url};
use crate::store::{DEFAULT_WRITE_ATTEMPTS, FileContent, VersionedStore, write_with_retry_inner};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use obsidian_log_auth::User;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Where the configuration is published.
pub const CONFIG_PATH: &str = ".obsidian-log/config.json";

/// Repository paths searched when loading, in order.
pub const CONFIG_PATHS: [&str; 2] = [CONFIG_PATH, "content/.obsidian-log/config.json"];

pub const CONFIG_COMMIT_MESSAGE: &str = "chore: update obsidian-log config";
pub const ICON_COMMIT_MESSAGE: &str = "chore: update author icon";

pub const AUTHOR_ICON_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Parsed site configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub github_repo_url: String,
    pub zenn_username: String,
    pub admins: Vec<String>,
    pub site_title: String,
    pub site_subtitle: String,
    pub author_icon: String,
}

fn string_field(doc: &Value, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl AppConfig {
    /// Parses a configuration document.
    ///
    /// Fields of the wrong type read as empty, non-string admins are
    /// dropped, and anything that is not a JSON object yields the default.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Ok(doc @ Value::Object(_)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };

        let admins = doc
            .get("admins")
            .and_then(Value::as_array)
            .map(|admins| {
                admins
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            github_repo_url: string_field(&doc, "github_repo_url"),
            zenn_username: string_field(&doc, "zenn_username"),
            admins,
            site_title: string_field(&doc, "site_title"),
            site_subtitle: string_field(&doc, "site_subtitle"),
            author_icon: string_field(&doc, "author_icon"),
        }
    }

    /// Returns true if `username` is listed in `admins`.
    ///
    /// Comparison ignores case and surrounding whitespace. An empty list
    /// admits nobody.
    #[must_use]
    pub fn is_admin_username(&self, username: &str) -> bool {
        let normalized = username.trim().to_lowercase();
        !normalized.is_empty()
            && self
                .admins
                .iter()
                .any(|admin| admin.trim().to_lowercase() == normalized)
    }

    /// The repository URL, if it is a valid one.
    #[must_use]
    pub fn repo(&self) -> Option<RepoRef> {
        RepoRef::parse(&self.github_repo_url).ok()
    }

    /// Serializes with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, ContentError> {
        serde_json::to_string_pretty(self).map_err(|e| ContentError::Encode {
            reason: e.to_string(),
        })
    }
}

/// A requested configuration change.
///
/// The required fields replace the current values; `None` keeps them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub github_repo_url: String,
    pub zenn_username: String,
    pub admins: Vec<String>,
    pub site_title: Option<String>,
    pub site_subtitle: Option<String>,
    pub author_icon: Option<String>,
}

impl ConfigUpdate {
    /// An update that republishes `config` unchanged.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            github_repo_url: config.github_repo_url.clone(),
            zenn_username: config.zenn_username.clone(),
            admins: config.admins.clone(),
            site_title: Some(config.site_title.clone()),
            site_subtitle: Some(config.site_subtitle.clone()),
            author_icon: Some(config.author_icon.clone()),
        }
    }

    fn apply(self, current: &AppConfig, fallback_repo: &RepoRef) -> AppConfig {
        let github_repo_url = if is_valid_repo_url(&self.github_repo_url) {
            self.github_repo_url
        } else if is_valid_repo_url(&current.github_repo_url) {
            current.github_repo_url.clone()
        } else {
            fallback_repo.to_string()
        };

        let merge = |update: Option<String>, current: &str| {
            update.map_or_else(|| current.to_string(), |value| value.trim().to_string())
        };

        AppConfig {
            github_repo_url,
            zenn_username: self.zenn_username.trim().to_string(),
            admins: self.admins,
            site_title: merge(self.site_title, &current.site_title),
            site_subtitle: merge(self.site_subtitle, &current.site_subtitle),
            author_icon: merge(self.author_icon, &current.author_icon),
        }
    }
}

/// Reads and publishes the site configuration.
pub struct SiteConfigService {
    store: Arc<dyn VersionedStore>,
    repo: RepoRef,
    local_path: Option<PathBuf>,
}

impl std::fmt::Debug for SiteConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteConfigService")
            .field("repo", &self.repo)
            .field("local_path", &self.local_path)
            .finish_non_exhaustive()
    }
}

impl SiteConfigService {
    /// Creates a service over `store`, which holds the files of `repo`.
    #[must_use]
    pub fn new(store: Arc<dyn VersionedStore>, repo: RepoRef) -> Self {
        Self {
            store,
            repo,
            local_path: None,
        }
    }

    /// Keeps a local copy at `<content_dir>/.obsidian-log/config.json`.
    ///
    /// The copy is read before the store and rewritten after every publish.
    #[must_use]
    pub fn with_local_copy(mut self, content_dir: impl AsRef<Path>) -> Self {
        self.local_path = Some(content_dir.as_ref().join(CONFIG_PATH));
        self
    }

    #[must_use]
    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Loads the configuration.
    ///
    /// Tries the local copy, then each of `CONFIG_PATHS` in the store.
    /// Falls back to the default when nothing is found.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn load(&self) -> AppConfig {
        if let Some(config) = self.read_local() {
            return config;
        }

        for path in CONFIG_PATHS {
            match self.store.read(path).await {
                Ok(Some(raw)) => return AppConfig::parse(&raw),
                Ok(None) => debug!(path, "no configuration at path"),
                Err(e) => warn!(path, error = %e, "failed to read configuration"),
            }
        }

        AppConfig::default()
    }

    /// Returns true if `actor` may administer the site.
    pub async fn is_admin(&self, actor: &User) -> bool {
        match actor.github_username() {
            Some(username) => self.load().await.is_admin_username(username),
            None => false,
        }
    }

    /// Applies `update` and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns `MissingGitHubUsername` or `NotAdmin` if `actor` may not
    /// change the configuration, or the store's error if the write fails.
    #[instrument(skip(self, update, actor), fields(repo = %self.repo, user = %actor.id()))]
    pub async fn publish(
        &self,
        update: ConfigUpdate,
        actor: &User,
    ) -> obsidian_log_core::Result<AppConfig, ContentError> {
        let current = self.authorize(actor).await?;
        let config = update.apply(&current, &self.repo);
        let document = config.to_pretty_json()?;

        write_with_retry_inner(
            self.store.as_ref(),
            CONFIG_PATH,
            FileContent::Text(document.clone()),
            CONFIG_COMMIT_MESSAGE,
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await
        .map_err(ContentError::from)?;

        info!(admins = config.admins.len(), "published site configuration");
        self.write_local(&document);
        Ok(config)
    }

    /// Uploads the author icon and returns its raw URL on `main`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedIconType` or `InvalidIcon` for bad input, an
    /// authorization error for non-admins, or the store's error.
    #[instrument(skip(self, actor, content_base64), fields(repo = %self.repo, user = %actor.id()))]
    pub async fn upload_author_icon(
        &self,
        actor: &User,
        content_base64: &str,
        filename: &str,
    ) -> obsidian_log_core::Result<String, ContentError> {
        self.authorize(actor).await?;

        let extension = icon_extension(filename)?;
        let content: String = content_base64
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        BASE64_STANDARD
            .decode(&content)
            .map_err(|e| ContentError::InvalidIcon {
                reason: e.to_string(),
            })?;

        let path = format!(".obsidian-log/author-icon.{extension}");
        write_with_retry_inner(
            self.store.as_ref(),
            &path,
            FileContent::Base64(content),
            ICON_COMMIT_MESSAGE,
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await
        .map_err(ContentError::from)?;

        Ok(self.repo.raw_url("main", &path))
    }

    async fn authorize(&self, actor: &User) -> Result<AppConfig, ContentError> {
        let username = actor
            .github_username()
            .ok_or(ContentError::MissingGitHubUsername)?;
        let current = self.load().await;
        if current.is_admin_username(username) {
            Ok(current)
        } else {
            Err(ContentError::NotAdmin {
                username: username.to_string(),
            })
        }
    }

    fn read_local(&self) -> Option<AppConfig> {
        let path = self.local_path.as_ref()?;
        match fs::read_to_string(path) {
            Ok(raw) => Some(AppConfig::parse(&raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read local configuration");
                None
            }
        }
    }

    fn write_local(&self, document: &str) {
        let Some(path) = &self.local_path else {
            return;
        };
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, document));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to refresh local configuration");
        }
    }
}

fn icon_extension(filename: &str) -> Result<String, ContentError> {
    let extension = filename.rsplit('.').next().unwrap_or_default().to_lowercase();
    if AUTHOR_ICON_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(ContentError::UnsupportedIconType { extension })
    }
}
