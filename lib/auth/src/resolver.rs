//! Cache-first admin resolution.

use crate::cache::AdminCache;
use crate::session::{Session, User};
use crate::verifier::{AdminVerifier, VerifyOutcome};
use std::time::Duration;
use tracing::debug;

/// Options for a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Consult the cache before going to the network.
    pub use_cache: bool,
    /// Wait before doing anything, to let a fresh sign-in settle.
    pub initial_delay: Duration,
}

impl ResolveOptions {
    /// Cache-enabled resolution with no initial delay.
    #[must_use]
    pub fn cached() -> Self {
        Self {
            use_cache: true,
            initial_delay: Duration::ZERO,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// The resolved admin status for a session's user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResolution {
    pub user: User,
    pub is_admin: bool,
}

/// Combines the cache and the verifier into one best-effort answer.
#[derive(Clone)]
pub struct AdminStateResolver {
    cache: AdminCache,
    verifier: AdminVerifier,
}

impl AdminStateResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(cache: AdminCache, verifier: AdminVerifier) -> Self {
        Self { cache, verifier }
    }

    /// Resolves admin status. Never fails: an inconclusive check degrades to
    /// the cached answer, and to "not admin" without one.
    pub async fn resolve(&self, session: &Session, options: ResolveOptions) -> AdminResolution {
        if !options.initial_delay.is_zero() {
            tokio::time::sleep(options.initial_delay).await;
        }

        if options.use_cache && self.cache.get(session.user_id()) {
            debug!(user_id = %session.user_id(), "admin confirmed from cache");
            return AdminResolution {
                user: session.user().clone(),
                is_admin: true,
            };
        }

        match self.verifier.verify(session).await {
            VerifyOutcome::Definitive { is_admin } => AdminResolution {
                user: session.user().clone(),
                is_admin,
            },
            VerifyOutcome::Inconclusive { session: last } => {
                let is_admin = self.cache.get(last.user_id());
                debug!(user_id = %last.user_id(), is_admin, "admin check inconclusive, using cache");
                AdminResolution {
                    user: last.user().clone(),
                    is_admin,
                }
            }
        }
    }
}
