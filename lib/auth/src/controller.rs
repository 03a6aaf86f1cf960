//! The auth state controller.
//!
//! One controller exists per application root. It owns the only
//! subscription to the identity provider's event stream and to the
//! visibility signal, and publishes its `AuthPhase` through a watch channel
//! that any number of consumers can read.
//!
//! # Transitions
//!
//! ```text
//!  Initializing / OAuthPending ──session──► Resolving ──► AuthenticatedAdmin
//!        │                                      │     └──► AuthenticatedNonAdmin
//!        └──no session / error / timeout──► Unauthenticated
//!
//!  SIGNED_IN  ──► Resolving ──► Authenticated*
//!  SIGNED_OUT ──► Unauthenticated (cache cleared)
//!  TOKEN_REFRESHED ──► (no change)
//!  visible    ──► cache hit: AuthenticatedAdmin, else re-resolve
//! ```
//!
//! Every handler that writes the phase starts a new generation together
//! with its first write. Later writes from an older generation are dropped,
//! so a slow resolution can never overwrite the outcome of a newer trigger.

use crate::cache::AdminCache;
use crate::callback::is_oauth_callback;
use crate::config::AuthConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, SilentSink};
use crate::error::{ControllerError, ProviderError};
use crate::provider::{
    AdminCheck, AdminCheckOutcome, AuthEvent, IdentityProvider, OAuthProvider, SignInRedirect,
};
use crate::resolver::{AdminStateResolver, ResolveOptions};
use crate::session::Session;
use crate::state::{AuthPhase, AuthSnapshot};
use crate::verifier::AdminVerifier;
use rootcause::Report;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info};

/// Tab visibility as reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Outcome of the initial session load, for the follow-up work done after
/// the time-bounded part.
enum InitOutcome {
    NoSession,
    CallbackPending,
    Settled { session: Session, is_admin: bool },
}

/// Builder for [`AuthStateController`].
pub struct AuthControllerBuilder {
    provider: Arc<dyn IdentityProvider>,
    admin_check: Arc<dyn AdminCheck>,
    cache: Option<AdminCache>,
    diagnostics: Arc<dyn DiagnosticSink>,
    config: AuthConfig,
}

impl AuthControllerBuilder {
    /// Uses the given admin cache instead of fresh in-memory storage.
    #[must_use]
    pub fn cache(mut self, cache: AdminCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the diagnostic sink. Defaults to [`SilentSink`].
    #[must_use]
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Sets the timings.
    #[must_use]
    pub fn config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the controller. Nothing runs until [`AuthStateController::start`].
    #[must_use]
    pub fn build(self) -> Arc<AuthStateController> {
        let cache = self.cache.unwrap_or_else(AdminCache::in_memory);
        let verifier = AdminVerifier::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.admin_check),
            cache.clone(),
            self.config.retry.clone(),
        );
        let resolver = AdminStateResolver::new(cache.clone(), verifier);
        let (state, _) = watch::channel(AuthPhase::Initializing);

        Arc::new(AuthStateController {
            provider: self.provider,
            admin_check: self.admin_check,
            resolver,
            cache,
            diagnostics: self.diagnostics,
            config: self.config,
            state,
            generation: AtomicU64::new(0),
            started: AtomicBool::new(false),
            last_token_refresh_report: Mutex::new(None),
        })
    }
}

/// Owns the auth state and reconciles every trigger into it.
pub struct AuthStateController {
    provider: Arc<dyn IdentityProvider>,
    admin_check: Arc<dyn AdminCheck>,
    resolver: AdminStateResolver,
    cache: AdminCache,
    diagnostics: Arc<dyn DiagnosticSink>,
    config: AuthConfig,
    state: watch::Sender<AuthPhase>,
    generation: AtomicU64,
    started: AtomicBool,
    last_token_refresh_report: Mutex<Option<Instant>>,
}

impl AuthStateController {
    /// Starts building a controller over the given collaborators.
    #[must_use]
    pub fn builder(
        provider: Arc<dyn IdentityProvider>,
        admin_check: Arc<dyn AdminCheck>,
    ) -> AuthControllerBuilder {
        AuthControllerBuilder {
            provider,
            admin_check,
            cache: None,
            diagnostics: Arc::new(SilentSink),
            config: AuthConfig::default(),
        }
    }

    /// Runs the initial resolution and subscribes to provider events and
    /// visibility signals.
    ///
    /// `location` is the URL the application was opened at; OAuth callback
    /// parameters in it enable the callback retry path.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if called more than once.
    pub fn start(
        self: &Arc<Self>,
        location: Option<&str>,
        visibility: mpsc::Receiver<Visibility>,
    ) -> obsidian_log_core::Result<ControllerHandle, ControllerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ControllerError::AlreadyStarted.into());
        }

        let is_callback = location.is_some_and(is_oauth_callback);
        let initial = if is_callback {
            AuthPhase::OAuthPending
        } else {
            AuthPhase::Initializing
        };
        let generation = self.begin(Some(initial));
        let events = self.provider.subscribe();

        let controller = Arc::clone(self);
        let driver = tokio::spawn(async move {
            controller
                .drive(generation, is_callback, events, visibility)
                .await;
        });

        Ok(ControllerHandle { driver })
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.state.borrow().clone()
    }

    /// Returns the consumer view of the current phase.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().snapshot()
    }

    /// Subscribes to phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthPhase> {
        self.state.subscribe()
    }

    /// Waits until no resolution is in flight and returns the phase.
    pub async fn wait_until_settled(&self) -> AuthPhase {
        let mut rx = self.state.subscribe();
        match rx.wait_for(AuthPhase::is_settled).await {
            Ok(phase) => phase.clone(),
            Err(_) => self.phase(),
        }
    }

    /// Returns the admin cache shared with the resolver.
    #[must_use]
    pub fn cache(&self) -> &AdminCache {
        &self.cache
    }

    /// Starts a GitHub OAuth sign-in.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the sign-in could not be started.
    pub async fn sign_in(&self, redirect_to: &str) -> Result<SignInRedirect, Report<ProviderError>> {
        Ok(self
            .provider
            .sign_in_with_oauth(OAuthProvider::GitHub, redirect_to)
            .await?)
    }

    /// Signs out. The local state is cleared even if the provider call fails.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after clearing local state.
    pub async fn sign_out(&self) -> Result<(), Report<ProviderError>> {
        let result = self.provider.sign_out().await;
        self.on_signed_out();
        result?;
        Ok(())
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        is_callback: bool,
        mut events: broadcast::Receiver<AuthEvent>,
        mut visibility: mpsc::Receiver<Visibility>,
    ) {
        let mut tasks = JoinSet::new();
        let controller = Arc::clone(&self);
        tasks.spawn(async move { controller.initialize(generation, is_callback).await });

        let mut events_open = true;
        let mut visibility_open = true;

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.dispatch(event, &mut tasks),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.diagnostics.report(DiagnosticEvent::TaskFailed {
                            reason: format!("missed {skipped} auth events"),
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                signal = visibility.recv(), if visibility_open => match signal {
                    Some(Visibility::Visible) => {
                        let controller = Arc::clone(&self);
                        tasks.spawn(async move { controller.on_visible().await });
                    }
                    Some(Visibility::Hidden) => {}
                    None => visibility_open = false,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result
                        && !e.is_cancelled()
                    {
                        self.diagnostics.report(DiagnosticEvent::TaskFailed {
                            reason: e.to_string(),
                        });
                    }
                },
                else => break,
            }
        }

        debug!("auth controller driver finished");
    }

    fn dispatch(self: &Arc<Self>, event: AuthEvent, tasks: &mut JoinSet<()>) {
        debug!(event = event.name(), "auth event");
        match event {
            AuthEvent::SignedIn(Some(session)) => {
                // The new generation starts here, before any later event is
                // dispatched, so a following SIGNED_OUT always wins.
                let generation = self.begin(Some(AuthPhase::Resolving {
                    user: session.user().clone(),
                }));
                let controller = Arc::clone(self);
                tasks.spawn(async move { controller.on_signed_in(generation, session).await });
            }
            AuthEvent::SignedIn(None) => debug!("sign-in event without session ignored"),
            AuthEvent::SignedOut => self.on_signed_out(),
            AuthEvent::TokenRefreshed(session) => self.on_token_refreshed(session.as_ref()),
        }
    }

    async fn initialize(self: Arc<Self>, generation: u64, is_callback: bool) {
        tokio::time::sleep(self.config.init_settle()).await;

        let loaded = tokio::time::timeout(
            self.config.init_timeout(),
            self.load_initial_session(generation, is_callback),
        )
        .await;

        let outcome = match loaded {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                self.report_failure("session init", &e);
                self.apply(generation, AuthPhase::Unauthenticated);
                return;
            }
            Err(_) => {
                let e = ControllerError::Timeout {
                    stage: "session init",
                    after_ms: self.config.init_timeout_ms,
                };
                self.report_failure("session init", &e);
                self.apply(generation, AuthPhase::Unauthenticated);
                return;
            }
        };

        match outcome {
            InitOutcome::NoSession => {}
            InitOutcome::CallbackPending => {
                tokio::time::sleep(self.config.oauth_pending_clear()).await;
                if self.apply(generation, AuthPhase::Unauthenticated) {
                    debug!("OAuth callback produced no session");
                }
            }
            InitOutcome::Settled {
                session,
                is_admin: true,
            } => self.reconfirm_admin(session).await,
            InitOutcome::Settled { .. } => {}
        }
    }

    async fn load_initial_session(
        &self,
        generation: u64,
        is_callback: bool,
    ) -> Result<InitOutcome, ControllerError> {
        let mut session = self.provider.get_session().await?;

        if session.is_none() && is_callback {
            for _ in 0..self.config.oauth_callback_retries {
                tokio::time::sleep(self.config.oauth_callback_retry_delay()).await;
                session = self.provider.get_session().await?;
                if session.is_some() {
                    break;
                }
            }
        }

        let Some(session) = session else {
            if is_callback {
                self.apply(generation, AuthPhase::OAuthPending);
                return Ok(InitOutcome::CallbackPending);
            }
            self.apply(generation, AuthPhase::Unauthenticated);
            return Ok(InitOutcome::NoSession);
        };

        self.apply(
            generation,
            AuthPhase::Resolving {
                user: session.user().clone(),
            },
        );
        let resolution = self
            .resolver
            .resolve(&session, ResolveOptions::cached())
            .await;
        let applied = self.apply(
            generation,
            AuthPhase::settled(resolution.user, resolution.is_admin),
        );

        Ok(InitOutcome::Settled {
            session,
            is_admin: applied && resolution.is_admin,
        })
    }

    /// Re-checks a freshly confirmed admin in the background. Never changes
    /// the phase; only the cache is touched.
    async fn reconfirm_admin(&self, session: Session) {
        let active = match self.provider.refresh_session().await {
            Ok(refreshed) => refreshed.unwrap_or(session),
            Err(e) => {
                self.report_failure("background admin refresh", &e.into());
                session
            }
        };

        match self.admin_check.check_is_admin(active.user_id()).await {
            AdminCheckOutcome::Definitive(true) => self.cache.set(active.user_id(), true),
            AdminCheckOutcome::Definitive(false) => {
                info!(user_id = %active.user_id(), "admin status revoked, dropping cached confirmation");
                self.cache.clear();
            }
            AdminCheckOutcome::Inconclusive => {
                debug!(user_id = %active.user_id(), "background admin check inconclusive");
            }
        }
    }

    async fn on_visible(self: Arc<Self>) {
        if self.config.reset_client_on_visible {
            self.provider.reset().await;
        }
        tokio::time::sleep(self.config.visibility_settle()).await;

        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                self.report_failure("visibility re-check", &e.into());
                return;
            }
        };
        let user = session.user().clone();

        if self.cache.get(user.id()) {
            self.begin(Some(AuthPhase::AuthenticatedAdmin { user }));
            return;
        }

        let same_user = self
            .state
            .borrow()
            .user()
            .is_some_and(|known| known.id() == user.id());
        let generation = self.begin((!same_user).then(|| AuthPhase::Resolving {
            user: user.clone(),
        }));

        let is_admin = match tokio::time::timeout(
            self.config.init_timeout(),
            self.resolver.resolve(&session, ResolveOptions::cached()),
        )
        .await
        {
            Ok(resolution) => resolution.is_admin,
            Err(_) => {
                let e = ControllerError::Timeout {
                    stage: "visibility re-check",
                    after_ms: self.config.init_timeout_ms,
                };
                self.report_failure("visibility re-check", &e);
                self.cache.get(user.id())
            }
        };

        self.apply(generation, AuthPhase::settled(user, is_admin));
    }

    async fn on_signed_in(self: Arc<Self>, generation: u64, session: Session) {
        let user = session.user().clone();

        let is_admin = match tokio::time::timeout(
            self.config.sign_in_timeout(),
            self.resolver.resolve(&session, ResolveOptions::cached()),
        )
        .await
        {
            Ok(resolution) => resolution.is_admin,
            Err(_) => {
                let e = ControllerError::Timeout {
                    stage: "sign-in admin resolution",
                    after_ms: self.config.sign_in_timeout_ms,
                };
                self.report_failure("sign-in admin resolution", &e);
                self.cache.get(user.id())
            }
        };

        self.apply(generation, AuthPhase::settled(user, is_admin));
    }

    fn on_signed_out(&self) {
        self.cache.clear();
        self.begin(Some(AuthPhase::Unauthenticated));
    }

    fn on_token_refreshed(&self, session: Option<&Session>) {
        let now = Instant::now();
        {
            let mut last = self
                .last_token_refresh_report
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| now.duration_since(at) < self.config.token_refresh_log_interval())
            {
                return;
            }
            *last = Some(now);
        }
        self.diagnostics.report(DiagnosticEvent::TokenRefreshed {
            expires_at: session.map(Session::expires_at),
        });
    }

    fn report_failure(&self, stage: &'static str, error: &ControllerError) {
        if error.is_abort() {
            return;
        }
        self.diagnostics
            .report(DiagnosticEvent::Failure { stage, error });
    }

    /// Starts a new generation, moving to `phase` in the same step.
    fn begin(&self, phase: Option<AuthPhase>) -> u64 {
        let mut generation = 0;
        self.state.send_if_modified(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            match phase {
                Some(next) if *current != next => {
                    *current = next;
                    true
                }
                _ => false,
            }
        });
        generation
    }

    /// Writes `phase` if `generation` is still the newest. Returns whether
    /// the write was accepted.
    fn apply(&self, generation: u64, phase: AuthPhase) -> bool {
        let mut accepted = false;
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            accepted = true;
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
        if !accepted {
            debug!(generation, "discarding stale auth result");
        }
        accepted
    }
}

/// Keeps the controller's subscriptions alive. Dropping it unsubscribes and
/// cancels every in-flight handler.
#[derive(Debug)]
pub struct ControllerHandle {
    driver: JoinHandle<()>,
}

impl ControllerHandle {
    /// Stops the controller.
    pub fn shutdown(self) {}

    /// Returns true once the driver has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
