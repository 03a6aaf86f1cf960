//! Admin authentication and authorization resolution for obsidian-log.
//!
//! This crate answers one question for the admin surface: who is signed in,
//! and are they an administrator? It provides:
//! - Session and user types (`Session`, `User`)
//! - The provider contracts (`IdentityProvider`, `AdminCheck`)
//! - A tab-scoped cache of confirmed admin status (`AdminCache`)
//! - Bounded-retry verification (`AdminVerifier`, `AdminStateResolver`)
//! - The single source of auth truth (`AuthStateController`)
//!
//! # Safety model
//!
//! Admin privilege is granted only on a definitive positive answer from the
//! server, or on a cached positive answer younger than the cache TTL. Every
//! failure resolves to "not admin". Consumers should gate admin UI on
//! `!loading && is_admin`.
//!
//! # Example
//!
//! ```
//! use obsidian_log_auth::mock::{MockIdentityProvider, ScriptedAdminCheck, test_session};
//! use obsidian_log_auth::{AdminCheckOutcome, AuthPhase, AuthStateController};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = Arc::new(MockIdentityProvider::with_session(test_session("uid_1")));
//! let check = Arc::new(ScriptedAdminCheck::always(AdminCheckOutcome::Definitive(true)));
//!
//! let controller = AuthStateController::builder(provider, check).build();
//! let (_visibility_tx, visibility_rx) = tokio::sync::mpsc::channel(1);
//! let _handle = controller.start(None, visibility_rx).expect("first start");
//!
//! let phase = controller.wait_until_settled().await;
//! assert!(phase.is_admin());
//! assert!(matches!(phase, AuthPhase::AuthenticatedAdmin { .. }));
//! # }
//! ```

pub mod cache;
pub mod callback;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod state;
pub mod verifier;

// Re-export main types at crate root
pub use cache::{ADMIN_CACHE_KEY, AdminCache, CacheStorage, FileStorage, MemoryStorage};
pub use callback::{CallbackParams, is_oauth_callback};
pub use config::AuthConfig;
pub use controller::{AuthControllerBuilder, AuthStateController, ControllerHandle, Visibility};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, SilentSink, TracingSink};
pub use error::{ControllerError, ProviderError, StorageError};
pub use provider::{
    AdminCheck, AdminCheckOutcome, AuthEvent, IdentityProvider, OAuthProvider, SignInRedirect,
};
pub use resolver::{AdminResolution, AdminStateResolver, ResolveOptions};
pub use session::{Session, User};
pub use state::{AuthPhase, AuthSnapshot};
pub use verifier::{AdminVerifier, RetryPolicy, VerifyOutcome};
