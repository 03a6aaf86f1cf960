//! Remote admin verification with nested retries.
//!
//! Admin status gates a privileged UI. Denying a real admin because of one
//! flaky request is worse than a few seconds of latency, so the check is
//! retried with linear backoff; granting access without a server-confirmed
//! answer never happens.

use crate::cache::AdminCache;
use crate::provider::{AdminCheck, IdentityProvider};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Retry and backoff settings for admin verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of outer attempts (each refreshes the session first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Outer attempt `n` waits `base_delay_ms * n` before starting.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Extra checks within one outer attempt after an inconclusive answer.
    #[serde(default = "default_inner_retries")]
    pub inner_retries: u32,
    /// Inner retry `i` waits `inner_delay_ms * i` before checking.
    #[serde(default = "default_inner_delay_ms")]
    pub inner_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    800
}

fn default_inner_retries() -> u32 {
    2
}

fn default_inner_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            inner_retries: default_inner_retries(),
            inner_delay_ms: default_inner_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before outer attempt `attempt` (zero-based).
    #[must_use]
    pub fn outer_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms * u64::from(attempt))
    }

    /// Delay before inner retry `retry` (one-based).
    #[must_use]
    pub fn inner_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.inner_delay_ms * u64::from(retry))
    }
}

/// Result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The server answered.
    Definitive { is_admin: bool },
    /// Every attempt was inconclusive. Carries the last known session.
    Inconclusive { session: Session },
}

/// Performs the remote admin check with bounded retries.
#[derive(Clone)]
pub struct AdminVerifier {
    provider: Arc<dyn IdentityProvider>,
    admin_check: Arc<dyn AdminCheck>,
    cache: AdminCache,
    policy: RetryPolicy,
}

impl AdminVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        admin_check: Arc<dyn AdminCheck>,
        cache: AdminCache,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            admin_check,
            cache,
            policy,
        }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Verifies admin status for the session's user.
    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    pub async fn verify(&self, session: &Session) -> VerifyOutcome {
        let mut active = session.clone();

        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.policy.outer_delay(attempt)).await;
            }

            match self.provider.refresh_session().await {
                Ok(Some(refreshed)) => active = refreshed,
                Ok(None) => {}
                Err(e) => debug!(attempt, error = %e, "session refresh failed, keeping previous session"),
            }

            if let Some(is_admin) = self.check(&active).await {
                return VerifyOutcome::Definitive { is_admin };
            }

            for retry in 1..=self.policy.inner_retries {
                tokio::time::sleep(self.policy.inner_delay(retry)).await;
                if let Some(is_admin) = self.check(&active).await {
                    return VerifyOutcome::Definitive { is_admin };
                }
            }

            debug!(attempt, "admin check inconclusive");
        }

        VerifyOutcome::Inconclusive { session: active }
    }

    async fn check(&self, session: &Session) -> Option<bool> {
        let is_admin = self
            .admin_check
            .check_is_admin(session.user_id())
            .await
            .definitive()?;
        if is_admin {
            self.cache.set(session.user_id(), true);
        }
        Some(is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockIdentityProvider, ScriptedAdminCheck, test_session};
    use crate::provider::AdminCheckOutcome;
    use obsidian_log_core::UserId;
    use tokio::time::Instant;

    fn verifier(
        provider: &Arc<MockIdentityProvider>,
        check: &Arc<ScriptedAdminCheck>,
        cache: &AdminCache,
    ) -> AdminVerifier {
        AdminVerifier::new(
            provider.clone(),
            check.clone(),
            cache.clone(),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn default_policy_matches_documented_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.outer_delay(0), Duration::ZERO);
        assert_eq!(policy.outer_delay(3), Duration::from_millis(2400));
        assert_eq!(policy.inner_retries, 2);
        assert_eq!(policy.inner_delay(2), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn definitive_first_answer_short_circuits() {
        let provider = Arc::new(MockIdentityProvider::new());
        let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Definitive(true)));
        let cache = AdminCache::in_memory();

        let started = Instant::now();
        let outcome = verifier(&provider, &check, &cache)
            .verify(&test_session("uid_1"))
            .await;

        assert_eq!(outcome, VerifyOutcome::Definitive { is_admin: true });
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(check.calls(), 1);
        assert_eq!(provider.refresh_calls(), 1);
        assert!(cache.get(&UserId::new("uid_1")));
    }

    #[tokio::test(start_paused = true)]
    async fn definitive_negative_is_not_cached() {
        let provider = Arc::new(MockIdentityProvider::new());
        let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Definitive(false)));
        let cache = AdminCache::in_memory();

        let outcome = verifier(&provider, &check, &cache)
            .verify(&test_session("uid_1"))
            .await;

        assert_eq!(outcome, VerifyOutcome::Definitive { is_admin: false });
        assert_eq!(check.calls(), 1);
        assert!(!cache.get(&UserId::new("uid_1")));
    }

    #[tokio::test(start_paused = true)]
    async fn inner_retry_recovers_within_first_attempt() {
        let provider = Arc::new(MockIdentityProvider::new());
        let check = Arc::new(ScriptedAdminCheck::scripted(
            [AdminCheckOutcome::Inconclusive, AdminCheckOutcome::Definitive(true)],
            AdminCheckOutcome::Inconclusive,
        ));
        let cache = AdminCache::in_memory();

        let started = Instant::now();
        let outcome = verifier(&provider, &check, &cache)
            .verify(&test_session("uid_1"))
            .await;

        assert_eq!(outcome, VerifyOutcome::Definitive { is_admin: true });
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert_eq!(check.calls(), 2);
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_runs_every_attempt() {
        let provider = Arc::new(MockIdentityProvider::new());
        let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Inconclusive));
        let cache = AdminCache::in_memory();
        let session = test_session("uid_1");

        let started = Instant::now();
        let outcome = verifier(&provider, &check, &cache).verify(&session).await;

        assert_eq!(outcome, VerifyOutcome::Inconclusive { session });
        assert_eq!(check.calls(), 12);
        assert_eq!(provider.refresh_calls(), 4);
        // outer: 800 + 1600 + 2400, inner: 4 * (1000 + 2000)
        assert_eq!(started.elapsed(), Duration::from_millis(16_800));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_session_is_used_and_returned() {
        let provider = Arc::new(MockIdentityProvider::new());
        let refreshed = test_session("uid_1").with_refresh_token(Some("rotated".to_string()));
        provider.set_refresh_result(Some(refreshed.clone()));
        let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Inconclusive));
        let cache = AdminCache::in_memory();

        let outcome = verifier(&provider, &check, &cache)
            .verify(&test_session("uid_1"))
            .await;

        assert_eq!(outcome, VerifyOutcome::Inconclusive { session: refreshed });
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_keeps_previous_session() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.fail_refresh(true);
        let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Definitive(true)));
        let cache = AdminCache::in_memory();

        let outcome = verifier(&provider, &check, &cache)
            .verify(&test_session("uid_1"))
            .await;

        assert_eq!(outcome, VerifyOutcome::Definitive { is_admin: true });
        assert_eq!(check.checked_users(), vec![UserId::new("uid_1")]);
    }
}
