//! GoTrue session client and PostgREST admin check.

use crate::config::SupabaseConfig;
use crate::error::SupabaseError;
use crate::wire::{GoTrueUser, TokenResponse, error_reason, expiry};
use async_trait::async_trait;
use obsidian_log_auth::{
    AdminCheck, AdminCheckOutcome, AuthEvent, CacheStorage, CallbackParams, IdentityProvider,
    OAuthProvider, ProviderError, Session, SignInRedirect, User,
};
use obsidian_log_core::{Clock, SystemClock, UserId};
use reqwest::{Method, RequestBuilder, Response};
use rootcause::Report;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Storage key of the persisted session.
pub const SESSION_STORAGE_KEY: &str = "obsidian-log-session";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = concat!("obsidian-log/", env!("CARGO_PKG_VERSION"));

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable {
        reason: e.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            reason: error_reason(&body),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            reason: e.to_string(),
        })
}

fn load_persisted(storage: &dyn CacheStorage) -> Option<Session> {
    match storage.get_item(SESSION_STORAGE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(error = %e, "discarding malformed stored session");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "failed to read stored session");
            None
        }
    }
}

/// Supabase client acting as identity provider and admin check.
pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    refresh_margin: chrono::Duration,
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<Session>>,
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base", &self.base.as_str())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Creates a client, hydrating any session persisted in `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or the URL is invalid.
    pub fn new(
        config: &SupabaseConfig,
        storage: Arc<dyn CacheStorage>,
    ) -> Result<Self, Report<SupabaseError>> {
        Self::with_clock(config, storage, Arc::new(SystemClock))
    }

    /// Creates a client that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or the URL is invalid.
    pub fn with_clock(
        config: &SupabaseConfig,
        storage: Arc<dyn CacheStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Report<SupabaseError>> {
        if !config.is_configured() {
            return Err(SupabaseError::NotConfigured.into());
        }

        let mut base = Url::parse(config.url.trim()).map_err(|e| SupabaseError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SupabaseError::Http {
                reason: e.to_string(),
            })?;

        let (events, _) = broadcast::channel(32);
        let session = load_persisted(storage.as_ref());

        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
            refresh_margin: chrono::Duration::seconds(config.refresh_margin_seconds),
            storage,
            clock,
            session: Mutex::new(session),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Returns the session held in memory without refreshing it.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    /// Completes an implicit-flow OAuth redirect.
    ///
    /// Reads the tokens from the callback URL, loads the user they belong
    /// to, stores the session and emits `SIGNED_IN`.
    ///
    /// # Errors
    ///
    /// Returns `Callback` if the URL carries an error or no tokens, or the
    /// provider's error if the user cannot be loaded.
    #[instrument(skip_all)]
    pub async fn complete_oauth_callback(
        &self,
        location: &str,
    ) -> obsidian_log_core::Result<Session, ProviderError> {
        let session = self.session_from_callback(location).await?;
        self.store(Some(session.clone()));
        info!(user_id = %session.user_id(), "signed in from OAuth callback");
        self.emit(AuthEvent::SignedIn(Some(session.clone())));
        Ok(session)
    }

    /// Verifies an access token with the server and returns its user.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` for an invalid or expired token.
    pub async fn get_user(&self, access_token: &str) -> obsidian_log_core::Result<User, ProviderError> {
        Ok(self.fetch_user(access_token).await?)
    }

    async fn session_from_callback(&self, location: &str) -> Result<Session, ProviderError> {
        let params = CallbackParams::parse(location).ok_or(ProviderError::Callback {
            reason: "callback location is not a URL".to_string(),
        })?;

        if let Some(reason) = params
            .get("error_description")
            .or_else(|| params.get("error"))
        {
            return Err(ProviderError::Callback {
                reason: reason.to_string(),
            });
        }

        let access_token = params.get("access_token").ok_or(ProviderError::Callback {
            reason: "no access token in callback URL".to_string(),
        })?;
        let expires_at = expiry(
            self.clock.now(),
            params.get("expires_at").and_then(|v| v.parse().ok()),
            params.get("expires_in").and_then(|v| v.parse().ok()),
        )
        .ok_or(ProviderError::Callback {
            reason: "no expiry in callback URL".to_string(),
        })?;

        let user = self.fetch_user(access_token).await?;

        Ok(Session::new(user, access_token, expires_at)
            .with_refresh_token(params.get("refresh_token").map(str::to_owned))
            .with_provider_token(params.get("provider_token").map(str::to_owned)))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, ProviderError> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .request(Method::GET, url, Some(access_token))
            .send()
            .await
            .map_err(transport)?;
        let user: GoTrueUser = decode(response).await?;
        Ok(user.into_user())
    }

    async fn query_admin(&self, user_id: &UserId) -> Result<bool, ProviderError> {
        let token = self
            .current_session()
            .map(|session| session.access_token().to_owned());

        let mut url = self.endpoint("rest/v1/admins")?;
        url.query_pairs_mut()
            .append_pair("select", "user_id")
            .append_pair("user_id", &format!("eq.{user_id}"));

        let response = self
            .request(Method::GET, url, token.as_deref())
            .send()
            .await
            .map_err(transport)?;
        let rows: Vec<serde_json::Value> = decode(response).await?;
        Ok(!rows.is_empty())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base
            .join(path)
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("invalid endpoint '{path}': {e}"),
            })
    }

    fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key))
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, session: Option<Session>) {
        let persisted = match &session {
            Some(session) => serde_json::to_string(session)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    self.storage
                        .set_item(SESSION_STORAGE_KEY, &raw)
                        .map_err(|e| e.to_string())
                }),
            None => self
                .storage
                .remove_item(SESSION_STORAGE_KEY)
                .map_err(|e| e.to_string()),
        };
        if let Err(reason) = persisted {
            warn!(%reason, "failed to persist session");
        }
        *self.lock_session() = session;
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers yet is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };

        let now = self.clock.now();
        if !session.expires_within(now, self.refresh_margin) {
            return Ok(Some(session));
        }

        if session.refresh_token().is_none() {
            return Ok((!session.is_expired_at(now)).then_some(session));
        }

        match self.refresh_session().await {
            Ok(refreshed) => Ok(refreshed),
            Err(e) if session.is_expired_at(now) => Err(e),
            Err(e) => {
                debug!(error = %e, "early refresh failed, session still valid");
                Ok(Some(session))
            }
        }
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<SignInRedirect, ProviderError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(SignInRedirect { url: url.into() })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(session) = self.current_session() {
            match self.endpoint("auth/v1/logout") {
                Ok(url) => {
                    match self
                        .request(Method::POST, url, Some(session.access_token()))
                        .send()
                        .await
                    {
                        Ok(response) if response.status().is_success() => {}
                        Ok(response) => {
                            debug!(status = %response.status(), "logout rejected, clearing local session");
                        }
                        Err(e) => debug!(error = %e, "logout failed, clearing local session"),
                    }
                }
                Err(e) => debug!(error = %e, "no logout endpoint"),
            }
        }

        self.store(None);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        let _guard = self.refresh_lock.lock().await;

        let Some(refresh_token) = self
            .current_session()
            .and_then(|session| session.refresh_token().map(str::to_owned))
        else {
            return Ok(None);
        };

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .request(Method::POST, url, None)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport)?;
        let token: TokenResponse = decode(response).await?;
        let session = token.into_session(self.clock.now())?;

        self.store(Some(session.clone()));
        self.emit(AuthEvent::TokenRefreshed(Some(session.clone())));
        Ok(Some(session))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn reset(&self) {
        let persisted = load_persisted(self.storage.as_ref());
        *self.lock_session() = persisted;
    }
}

#[async_trait]
impl AdminCheck for SupabaseClient {
    async fn check_is_admin(&self, user_id: &UserId) -> AdminCheckOutcome {
        match self.query_admin(user_id).await {
            Ok(is_admin) => AdminCheckOutcome::Definitive(is_admin),
            Err(e) => {
                debug!(%user_id, error = %e, "admin check inconclusive");
                AdminCheckOutcome::Inconclusive
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsidian_log_auth::MemoryStorage;

    fn client(url: &str) -> SupabaseClient {
        SupabaseClient::new(
            &SupabaseConfig::new(url, "anon"),
            Arc::new(MemoryStorage::new()),
        )
        .expect("client")
    }

    #[test]
    fn missing_configuration_is_rejected() {
        let result = SupabaseClient::new(
            &SupabaseConfig::new("", "anon"),
            Arc::new(MemoryStorage::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = SupabaseClient::new(
            &SupabaseConfig::new("not a url", "anon"),
            Arc::new(MemoryStorage::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn endpoints_keep_base_path() {
        let client = client("http://localhost:54321/project");
        assert_eq!(
            client.endpoint("auth/v1/user").expect("endpoint").as_str(),
            "http://localhost:54321/project/auth/v1/user"
        );
    }

    #[tokio::test]
    async fn authorize_url_carries_provider_and_redirect() {
        let client = client("https://abcd.supabase.co");
        let redirect = client
            .sign_in_with_oauth(OAuthProvider::GitHub, "https://blog.example.com/admin")
            .await
            .expect("redirect");
        let url = Url::parse(&redirect.url).expect("url");
        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "github".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "https://blog.example.com/admin".to_string()
        )));
    }

    #[tokio::test]
    async fn refresh_without_session_is_none() {
        let client = client("https://abcd.supabase.co");
        assert_eq!(client.refresh_session().await, Ok(None));
        assert_eq!(client.get_session().await, Ok(None));
    }

    #[tokio::test]
    async fn callback_error_is_surfaced() {
        let client = client("https://abcd.supabase.co");
        let result = client
            .session_from_callback(
                "https://blog.example.com/admin#error=access_denied&error_description=User+denied",
            )
            .await;
        assert_eq!(
            result,
            Err(ProviderError::Callback {
                reason: "User denied".to_string()
            })
        );
    }

    #[tokio::test]
    async fn callback_without_tokens_is_rejected() {
        let client = client("https://abcd.supabase.co");
        let result = client
            .session_from_callback("https://blog.example.com/admin?code=xyz")
            .await;
        assert!(matches!(result, Err(ProviderError::Callback { .. })));
    }

    #[tokio::test]
    async fn callback_with_oversized_lifetime_is_rejected() {
        let client = client("https://abcd.supabase.co");
        for lifetime in ["99999999999999", "9223372036854775807"] {
            let result = client
                .session_from_callback(&format!(
                    "https://blog.example.com/admin#access_token=at&expires_in={lifetime}"
                ))
                .await;
            assert_eq!(
                result,
                Err(ProviderError::Callback {
                    reason: "no expiry in callback URL".to_string()
                }),
                "{lifetime}"
            );
        }
    }
}
