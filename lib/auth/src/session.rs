//! Sessions and users as issued by the identity provider.
//!
//! A session is the provider's proof of authentication: the user it belongs
//! to, an access token used to authorize the admin check and content writes,
//! and an expiry. It is created on sign-in, replaced on token refresh and
//! destroyed on sign-out; the controller only ever holds clones.

use chrono::{DateTime, Duration, Utc};
use obsidian_log_core::UserId;
use serde::{Deserialize, Serialize};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier issued by the identity provider.
    id: UserId,
    /// Email address, if the provider shared one.
    email: Option<String>,
    /// GitHub login of the upstream OAuth account.
    github_username: Option<String>,
    /// Avatar URL from the upstream OAuth account.
    avatar_url: Option<String>,
}

impl User {
    /// Creates a user with only an identifier.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            github_username: None,
            avatar_url: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the GitHub login.
    #[must_use]
    pub fn with_github_username(mut self, username: Option<String>) -> Self {
        self.github_username = username;
        self
    }

    /// Sets the avatar URL.
    #[must_use]
    pub fn with_avatar_url(mut self, url: Option<String>) -> Self {
        self.avatar_url = url;
        self
    }

    /// Returns the user's ID.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Returns the email address, if present.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the GitHub login, if present.
    #[must_use]
    pub fn github_username(&self) -> Option<&str> {
        self.github_username.as_deref()
    }

    /// Returns the avatar URL, if present.
    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

/// An identity-provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user: User,
    access_token: String,
    refresh_token: Option<String>,
    /// Upstream OAuth token (GitHub), used for content writes.
    provider_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for the given user.
    #[must_use]
    pub fn new(user: User, access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
            refresh_token: None,
            provider_token: None,
            expires_at,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: Option<String>) -> Self {
        self.refresh_token = token;
        self
    }

    /// Sets the upstream provider token.
    #[must_use]
    pub fn with_provider_token(mut self, token: Option<String>) -> Self {
        self.provider_token = token;
        self
    }

    /// Returns the user this session belongs to.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Returns the user's ID.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        self.user.id()
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the upstream provider token, if present.
    #[must_use]
    pub fn provider_token(&self) -> Option<&str> {
        self.provider_token.as_deref()
    }

    /// Returns when the access token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the session expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User::new("uid_123")
            .with_email(Some("author@example.com".to_string()))
            .with_github_username(Some("octo-author".to_string()))
    }

    #[test]
    fn user_builder() {
        let user = test_user().with_avatar_url(Some("https://avatars.example/u/1".to_string()));
        assert_eq!(user.id().as_str(), "uid_123");
        assert_eq!(user.email(), Some("author@example.com"));
        assert_eq!(user.github_username(), Some("octo-author"));
        assert_eq!(user.avatar_url(), Some("https://avatars.example/u/1"));
    }

    #[test]
    fn new_session_has_no_optional_tokens() {
        let expires = Utc::now() + Duration::hours(1);
        let session = Session::new(test_user(), "access", expires);

        assert_eq!(session.user_id().as_str(), "uid_123");
        assert_eq!(session.access_token(), "access");
        assert!(session.refresh_token().is_none());
        assert!(session.provider_token().is_none());
        assert_eq!(session.expires_at(), expires);
    }

    #[test]
    fn session_with_tokens() {
        let session = Session::new(test_user(), "access", Utc::now())
            .with_refresh_token(Some("refresh".to_string()))
            .with_provider_token(Some("gho_abc".to_string()));

        assert_eq!(session.refresh_token(), Some("refresh"));
        assert_eq!(session.provider_token(), Some("gho_abc"));
    }

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        let session = Session::new(test_user(), "access", now + Duration::minutes(5));

        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::minutes(5)));
        assert!(!session.expires_within(now, Duration::minutes(1)));
        assert!(session.expires_within(now, Duration::minutes(5)));
    }

    #[test]
    fn session_serialization_roundtrip() {
        let session = Session::new(test_user(), "access", Utc::now())
            .with_refresh_token(Some("refresh".to_string()));

        let json = serde_json::to_string(&session).expect("serialize");
        let parsed: Session = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, session);
    }
}
