//! In-memory doubles for the identity provider and the admin check.
//!
//! Used by this crate's tests and, through the `test-util` feature, by
//! downstream tests that drive an `AuthStateController` without a network.

use crate::error::ProviderError;
use crate::provider::{
    AdminCheck, AdminCheckOutcome, AuthEvent, IdentityProvider, OAuthProvider, SignInRedirect,
};
use crate::session::{Session, User};
use async_trait::async_trait;
use chrono::DateTime;
use obsidian_log_core::UserId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a session for `user_id` that expires far in the future.
#[must_use]
pub fn test_session(user_id: &str) -> Session {
    let expires_at = DateTime::from_timestamp(4_102_444_800, 0).unwrap_or_default();
    Session::new(User::new(user_id), format!("access-{user_id}"), expires_at)
        .with_refresh_token(Some(format!("refresh-{user_id}")))
}

/// Identity provider double with a settable session and event stream.
#[derive(Debug)]
pub struct MockIdentityProvider {
    session: Mutex<Option<Session>>,
    misses_remaining: Mutex<usize>,
    get_session_delay: Mutex<Duration>,
    get_session_error: Mutex<Option<ProviderError>>,
    refresh_result: Mutex<Option<Session>>,
    refresh_fails: AtomicBool,
    events: broadcast::Sender<AuthEvent>,
    get_session_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    reset_calls: AtomicUsize,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    /// Creates a provider with no session.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            misses_remaining: Mutex::new(0),
            get_session_delay: Mutex::new(Duration::ZERO),
            get_session_error: Mutex::new(None),
            refresh_result: Mutex::new(None),
            refresh_fails: AtomicBool::new(false),
            events,
            get_session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a provider holding `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let provider = Self::new();
        provider.set_session(Some(session));
        provider
    }

    /// Replaces the stored session.
    pub fn set_session(&self, session: Option<Session>) {
        *lock(&self.session) = session;
    }

    /// Makes the next `count` session fetches report no session, as while
    /// an OAuth callback is still being exchanged.
    pub fn miss_sessions(&self, count: usize) {
        *lock(&self.misses_remaining) = count;
    }

    /// Delays every session fetch.
    pub fn set_get_session_delay(&self, delay: Duration) {
        *lock(&self.get_session_delay) = delay;
    }

    /// Makes session fetches fail as unavailable.
    pub fn fail_get_session(&self, fail: bool) {
        self.fail_get_session_with(fail.then(|| ProviderError::Unavailable {
            reason: "mock session fetch failure".to_string(),
        }));
    }

    /// Makes session fetches fail with `error`; `None` lets them succeed.
    pub fn fail_get_session_with(&self, error: Option<ProviderError>) {
        *lock(&self.get_session_error) = error;
    }

    /// Sets what `refresh_session` returns.
    pub fn set_refresh_result(&self, session: Option<Session>) {
        *lock(&self.refresh_result) = session;
    }

    /// Makes `refresh_session` fail.
    pub fn fail_refresh(&self, fail: bool) {
        self.refresh_fails.store(fail, Ordering::SeqCst);
    }

    /// Pushes an event to subscribers.
    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    #[must_use]
    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.get_session_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = lock(&self.get_session_error).clone() {
            return Err(error);
        }

        {
            let mut misses = lock(&self.misses_remaining);
            if *misses > 0 {
                *misses -= 1;
                return Ok(None);
            }
        }

        Ok(lock(&self.session).clone())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<SignInRedirect, ProviderError> {
        Ok(SignInRedirect {
            url: format!(
                "https://auth.example.test/authorize?provider={provider}&redirect_to={redirect_to}"
            ),
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.set_session(None);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 400,
                reason: "mock refresh failure".to_string(),
            });
        }
        Ok(lock(&self.refresh_result).clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn reset(&self) {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Admin check double that replays scripted outcomes.
#[derive(Debug)]
pub struct ScriptedAdminCheck {
    script: Mutex<VecDeque<AdminCheckOutcome>>,
    fallback: Mutex<AdminCheckOutcome>,
    delay: Mutex<Duration>,
    checked: Mutex<Vec<UserId>>,
}

impl ScriptedAdminCheck {
    /// Answers every check with `outcome`.
    #[must_use]
    pub fn always(outcome: AdminCheckOutcome) -> Self {
        Self::scripted([], outcome)
    }

    /// Answers with `script` in order, then with `fallback`.
    #[must_use]
    pub fn scripted(
        script: impl IntoIterator<Item = AdminCheckOutcome>,
        fallback: AdminCheckOutcome,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Mutex::new(fallback),
            delay: Mutex::new(Duration::ZERO),
            checked: Mutex::new(Vec::new()),
        }
    }

    /// Delays every answer.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = delay;
        self
    }

    /// Changes the answer once the script is exhausted.
    pub fn set_fallback(&self, outcome: AdminCheckOutcome) {
        *lock(&self.fallback) = outcome;
    }

    /// Number of checks started.
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.checked).len()
    }

    /// Users checked, in order.
    #[must_use]
    pub fn checked_users(&self) -> Vec<UserId> {
        lock(&self.checked).clone()
    }
}

#[async_trait]
impl AdminCheck for ScriptedAdminCheck {
    async fn check_is_admin(&self, user_id: &UserId) -> AdminCheckOutcome {
        lock(&self.checked).push(user_id.clone());

        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| *lock(&self.fallback))
    }
}
