//! Wiring of the Supabase client, the auth controller and the content store,
//! and the commands built on them.

use crate::config::AdminConfig;
use crate::error::CliError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use obsidian_log_auth::{
    AdminCache, AuthPhase, AuthSnapshot, AuthStateController, CacheStorage, ControllerHandle,
    FileStorage, User, Visibility,
};
use obsidian_log_content::{
    AppConfig, ConfigUpdate, GitHubClient, GitHubStore, RepoRef, SiteConfigService,
};
use obsidian_log_supabase::SupabaseClient;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Changes requested by `publish-config`. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ConfigChanges {
    pub repo_url: Option<String>,
    pub zenn_username: Option<String>,
    pub admins: Vec<String>,
    pub site_title: Option<String>,
    pub site_subtitle: Option<String>,
    pub author_icon: Option<String>,
}

impl ConfigChanges {
    fn into_update(self, current: &AppConfig) -> ConfigUpdate {
        let mut update = ConfigUpdate::from_config(current);
        if let Some(url) = self.repo_url {
            update.github_repo_url = url;
        }
        if let Some(username) = self.zenn_username {
            update.zenn_username = username;
        }
        if !self.admins.is_empty() {
            update.admins = self.admins;
        }
        update.site_title = self.site_title.or(update.site_title);
        update.site_subtitle = self.site_subtitle.or(update.site_subtitle);
        update.author_icon = self.author_icon.or(update.author_icon);
        update
    }
}

/// The CLI's long-lived collaborators.
pub struct App {
    config: AdminConfig,
    client: Arc<SupabaseClient>,
    controller: Arc<AuthStateController>,
}

impl App {
    /// Builds the client and controller, persisting state under
    /// `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Supabase configuration is unusable.
    pub fn new(config: AdminConfig) -> obsidian_log_core::Result<Self, CliError> {
        let storage: Arc<dyn CacheStorage> = Arc::new(FileStorage::new(&config.state_dir));
        let client = SupabaseClient::new(&config.supabase, Arc::clone(&storage))
            .map(Arc::new)
            .map_err(|e| CliError::Supabase {
                reason: e.to_string(),
            })?;

        let controller = AuthStateController::builder(client.clone(), client.clone())
            .cache(AdminCache::new(storage))
            .diagnostics(config.diagnostics())
            .config(config.auth.clone())
            .build();

        Ok(Self {
            config,
            client,
            controller,
        })
    }

    fn start(
        &self,
        location: Option<&str>,
    ) -> Result<(ControllerHandle, mpsc::Sender<Visibility>), CliError> {
        let (visibility_tx, visibility_rx) = mpsc::channel(8);
        let handle = self
            .controller
            .start(location, visibility_rx)
            .map_err(|e| CliError::Auth {
                reason: e.to_string(),
            })?;
        Ok((handle, visibility_tx))
    }

    async fn settle(&self, location: Option<&str>) -> Result<AuthPhase, CliError> {
        let (handle, _visibility) = self.start(location)?;
        let phase = self.controller.wait_until_settled().await;
        handle.shutdown();
        Ok(phase)
    }

    /// Returns the GitHub sign-in URL to open in a browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the sign-in could not be started.
    pub async fn login(&self, redirect_to: Option<&str>) -> obsidian_log_core::Result<String, CliError> {
        let redirect_to = redirect_to.unwrap_or(&self.config.redirect_to);
        let redirect = self
            .controller
            .sign_in(redirect_to)
            .await
            .map_err(|e| CliError::Supabase {
                reason: e.to_string(),
            })?;
        Ok(redirect.url)
    }

    /// Completes a sign-in from the URL the browser was redirected to.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback carries no usable tokens.
    pub async fn callback(&self, url: &str) -> obsidian_log_core::Result<AuthSnapshot, CliError> {
        self.client
            .complete_oauth_callback(url)
            .await
            .map_err(|e| CliError::Supabase {
                reason: e.to_string(),
            })?;
        Ok(self.settle(Some(url)).await?.snapshot())
    }

    /// Resolves and returns the current auth state.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot start.
    pub async fn status(&self) -> obsidian_log_core::Result<AuthSnapshot, CliError> {
        Ok(self.settle(None).await?.snapshot())
    }

    /// Prints every auth state change until interrupted.
    ///
    /// Lines `visible` and `hidden` on stdin are forwarded as visibility
    /// signals.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot start or output fails.
    pub async fn watch(&self) -> obsidian_log_core::Result<(), CliError> {
        let mut phases = self.controller.subscribe();
        let (handle, visibility) = self.start(None)?;
        let forwarder = tokio::spawn(forward_visibility(visibility));
        print_json(&self.controller.snapshot())?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                changed = phases.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = phases.borrow_and_update().snapshot();
                    print_json(&snapshot)?;
                }
                _ = &mut ctrl_c => {
                    info!("interrupted");
                    break;
                }
            }
        }

        forwarder.abort();
        handle.shutdown();
        Ok(())
    }

    /// Signs out and clears the persisted session and admin cache.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; local state is cleared regardless.
    pub async fn sign_out(&self) -> obsidian_log_core::Result<(), CliError> {
        self.controller
            .sign_out()
            .await
            .map_err(|e| CliError::Supabase {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Applies `changes` to the site configuration and publishes it.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn`/`NotAdmin` for unauthorized users, or the
    /// repository's error.
    pub async fn publish_config(
        &self,
        changes: ConfigChanges,
    ) -> obsidian_log_core::Result<AppConfig, CliError> {
        let actor = self.require_admin().await?;
        let service = self.site_config()?;

        let current = service.load().await;
        let update = changes.into_update(&current);
        let published = service
            .publish(update, &actor)
            .await
            .map_err(|e| CliError::Content {
                reason: e.to_string(),
            })?;
        Ok(published)
    }

    /// Uploads an image file as the author icon and returns its URL.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn`/`NotAdmin` for unauthorized users, an I/O
    /// error if the file cannot be read, or the repository's error.
    pub async fn upload_icon(&self, path: &Path) -> obsidian_log_core::Result<String, CliError> {
        let actor = self.require_admin().await?;
        let service = self.site_config()?;

        let bytes = tokio::fs::read(path).await.map_err(|e| CliError::Io {
            reason: format!("{}: {e}", path.display()),
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let url = service
            .upload_author_icon(&actor, &BASE64_STANDARD.encode(bytes), &filename)
            .await
            .map_err(|e| CliError::Content {
                reason: e.to_string(),
            })?;
        Ok(url)
    }

    async fn require_admin(&self) -> Result<User, CliError> {
        match self.settle(None).await? {
            AuthPhase::AuthenticatedAdmin { user } => Ok(user),
            AuthPhase::AuthenticatedNonAdmin { .. } => Err(CliError::NotAdmin),
            _ => Err(CliError::NotSignedIn),
        }
    }

    fn site_config(&self) -> Result<SiteConfigService, CliError> {
        let repo = RepoRef::parse(&self.config.github.repo_url).map_err(|e| CliError::Config {
            reason: format!("GITHUB__REPO_URL: {e}"),
        })?;

        // The provider token acts for the signed-in user; the configured
        // token is the fallback.
        let token = self
            .client
            .current_session()
            .and_then(|session| session.provider_token().map(str::to_string))
            .or_else(|| self.config.github.token.clone());
        if token.is_none() {
            warn!("no GitHub token available, commits will be rejected");
        }

        let client = GitHubClient::new(token).map_err(|e| CliError::Content {
            reason: e.to_string(),
        })?;
        let store = Arc::new(GitHubStore::new(client, repo.clone()));
        let service = SiteConfigService::new(store, repo);
        Ok(match &self.config.content_dir {
            Some(dir) => service.with_local_copy(dir),
            None => service,
        })
    }
}

fn parse_visibility(line: &str) -> Option<Visibility> {
    match line.trim().to_ascii_lowercase().as_str() {
        "visible" => Some(Visibility::Visible),
        "hidden" => Some(Visibility::Hidden),
        _ => None,
    }
}

async fn forward_visibility(visibility: mpsc::Sender<Visibility>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_visibility(&line) {
                Some(signal) => {
                    if visibility.send(signal).await.is_err() {
                        return;
                    }
                }
                None => warn!(%line, "expected 'visible' or 'hidden'"),
            },
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "stdin closed");
                return;
            }
        }
    }
}

/// Writes `value` to stdout as one line of JSON.
///
/// # Errors
///
/// Returns an I/O error if serialization fails.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let line = serde_json::to_string(value).map_err(|e| CliError::Io {
        reason: e.to_string(),
    })?;
    println!("{line}");
    Ok(())
}
