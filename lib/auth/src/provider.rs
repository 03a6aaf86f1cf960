//! Contracts of the external collaborators the auth flow depends on.
//!
//! The identity provider owns sessions and pushes auth events; the admin
//! check answers whether a user is on the server-side admin allow-list.
//! Both are traits so the controller can be driven by the Supabase client in
//! production and by in-memory doubles in tests.

use crate::error::ProviderError;
use crate::session::Session;
use async_trait::async_trait;
use obsidian_log_core::UserId;
use std::fmt;
use tokio::sync::broadcast;

/// Events pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in (here or in another tab).
    SignedIn(Option<Session>),
    /// The user signed out.
    SignedOut,
    /// The access token was refreshed; authorization did not change.
    TokenRefreshed(Option<Session>),
}

impl AuthEvent {
    /// Returns the provider's wire name for the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed(_) => "TOKEN_REFRESHED",
        }
    }
}

/// Upstream OAuth providers the identity provider can federate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OAuthProvider {
    #[default]
    GitHub,
}

impl OAuthProvider {
    /// Returns the provider slug used in authorize URLs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to send the browser to start an OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRedirect {
    /// The provider's authorize URL.
    pub url: String,
}

/// The identity provider's session API.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the current session, if any.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Starts an OAuth sign-in, returning the redirect to follow.
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<SignInRedirect, ProviderError>;

    /// Signs the current user out.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Exchanges the refresh token for a fresh session.
    ///
    /// Returns `None` when there is nothing to refresh.
    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribes to pushed auth events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Discards in-memory client state and re-hydrates from storage.
    async fn reset(&self) {}
}

/// Outcome of a remote admin-membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheckOutcome {
    /// The server answered; `true` means the user is an administrator.
    Definitive(bool),
    /// No answer (network or server failure). Not a denial.
    Inconclusive,
}

impl AdminCheckOutcome {
    /// Returns the answer if the check was definitive.
    #[must_use]
    pub fn definitive(self) -> Option<bool> {
        match self {
            Self::Definitive(is_admin) => Some(is_admin),
            Self::Inconclusive => None,
        }
    }
}

/// The remote admin-membership check.
#[async_trait]
pub trait AdminCheck: Send + Sync {
    /// Checks whether the user is on the admin allow-list.
    async fn check_is_admin(&self, user_id: &UserId) -> AdminCheckOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_provider_wire_names() {
        assert_eq!(AuthEvent::SignedIn(None).name(), "SIGNED_IN");
        assert_eq!(AuthEvent::SignedOut.name(), "SIGNED_OUT");
        assert_eq!(AuthEvent::TokenRefreshed(None).name(), "TOKEN_REFRESHED");
    }

    #[test]
    fn oauth_provider_slug() {
        assert_eq!(OAuthProvider::GitHub.to_string(), "github");
        assert_eq!(OAuthProvider::default(), OAuthProvider::GitHub);
    }

    #[test]
    fn admin_check_outcome_definitive() {
        assert_eq!(AdminCheckOutcome::Definitive(true).definitive(), Some(true));
        assert_eq!(AdminCheckOutcome::Definitive(false).definitive(), Some(false));
        assert_eq!(AdminCheckOutcome::Inconclusive.definitive(), None);
    }
}
