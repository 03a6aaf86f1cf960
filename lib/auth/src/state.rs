//! Auth state as seen by consumers.
//!
//! The controller tracks a single `AuthPhase`. Everything a consumer reads
//! (`user`, `is_admin`, `loading`, `oauth_callback_pending`) is derived from
//! it, so impossible combinations such as "admin without a user" or "ready
//! while the admin check is still running" cannot be represented.

use crate::session::User;
use serde::Serialize;

/// The controller's state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthPhase {
    /// Initial session fetch in flight; no user known yet.
    #[default]
    Initializing,
    /// The URL carried an OAuth callback but no session is available yet.
    OAuthPending,
    /// A user is known; their admin check has not completed.
    Resolving { user: User },
    /// No session.
    Unauthenticated,
    /// Signed in, not an administrator.
    AuthenticatedNonAdmin { user: User },
    /// Signed in as an administrator.
    AuthenticatedAdmin { user: User },
}

impl AuthPhase {
    /// The settled phase for a resolved user.
    #[must_use]
    pub fn settled(user: User, is_admin: bool) -> Self {
        if is_admin {
            Self::AuthenticatedAdmin { user }
        } else {
            Self::AuthenticatedNonAdmin { user }
        }
    }

    /// Returns the known user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Resolving { user }
            | Self::AuthenticatedNonAdmin { user }
            | Self::AuthenticatedAdmin { user } => Some(user),
            Self::Initializing | Self::OAuthPending | Self::Unauthenticated => None,
        }
    }

    /// True only for a confirmed administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::AuthenticatedAdmin { .. })
    }

    /// True while any resolution is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::OAuthPending | Self::Resolving { .. }
        )
    }

    /// True while an OAuth callback is awaiting its session.
    #[must_use]
    pub fn is_oauth_callback_pending(&self) -> bool {
        matches!(self, Self::OAuthPending)
    }

    /// True for phases with a definitive answer.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_loading()
    }

    /// Returns the consumer view of this phase.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot::from(self)
    }
}

/// The flattened view consumers gate access on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub is_admin: bool,
    pub loading: bool,
    pub oauth_callback_pending: bool,
}

impl From<&AuthPhase> for AuthSnapshot {
    fn from(phase: &AuthPhase) -> Self {
        Self {
            user: phase.user().cloned(),
            is_admin: phase.is_admin(),
            loading: phase.is_loading(),
            oauth_callback_pending: phase.is_oauth_callback_pending(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("uid_1")
    }

    #[test]
    fn initial_phase_is_loading() {
        let phase = AuthPhase::default();
        assert_eq!(phase, AuthPhase::Initializing);
        assert!(phase.is_loading());
        assert!(phase.user().is_none());
    }

    #[test]
    fn unauthenticated_snapshot() {
        let snapshot = AuthPhase::Unauthenticated.snapshot();
        assert_eq!(
            snapshot,
            AuthSnapshot {
                user: None,
                is_admin: false,
                loading: false,
                oauth_callback_pending: false,
            }
        );
    }

    #[test]
    fn oauth_pending_is_loading_without_user() {
        let snapshot = AuthPhase::OAuthPending.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.oauth_callback_pending);
        assert!(snapshot.user.is_none());
    }

    #[test]
    fn resolving_has_user_and_is_loading() {
        let snapshot = AuthPhase::Resolving { user: user() }.snapshot();
        assert_eq!(snapshot.user, Some(user()));
        assert!(snapshot.loading);
        assert!(!snapshot.is_admin);
    }

    #[test]
    fn settled_phases() {
        let admin = AuthPhase::settled(user(), true);
        assert_eq!(admin, AuthPhase::AuthenticatedAdmin { user: user() });
        assert!(admin.is_admin());
        assert!(admin.is_settled());

        let non_admin = AuthPhase::settled(user(), false);
        assert_eq!(non_admin, AuthPhase::AuthenticatedNonAdmin { user: user() });
        assert!(!non_admin.is_admin());
        assert!(non_admin.is_settled());
    }

    #[test]
    fn admin_requires_user() {
        for phase in [
            AuthPhase::Initializing,
            AuthPhase::OAuthPending,
            AuthPhase::Unauthenticated,
        ] {
            assert!(!phase.is_admin());
            assert!(phase.user().is_none());
        }
    }
}
