//! Timings of the auth flow.
//!
//! Every delay and bound the controller uses lives here with its default, so
//! deployments can tune them through configuration.

use crate::verifier::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auth controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Delay before the first session fetch, letting the provider hydrate
    /// from storage.
    #[serde(default = "default_init_settle_ms")]
    pub init_settle_ms: u64,

    /// Overall bound on the initial session fetch and admin resolution.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Session fetch retries while an OAuth callback is being processed.
    #[serde(default = "default_oauth_callback_retries")]
    pub oauth_callback_retries: u32,

    /// Delay between OAuth callback session fetch retries.
    #[serde(default = "default_oauth_callback_retry_delay_ms")]
    pub oauth_callback_retry_delay_ms: u64,

    /// How long an unresolved OAuth callback keeps the UI pending.
    #[serde(default = "default_oauth_pending_clear_ms")]
    pub oauth_pending_clear_ms: u64,

    /// Delay before re-checking after the tab becomes visible.
    #[serde(default = "default_visibility_settle_ms")]
    pub visibility_settle_ms: u64,

    /// Reset the provider client before the visibility re-check.
    #[serde(default)]
    pub reset_client_on_visible: bool,

    /// Bound on admin resolution after a pushed sign-in.
    #[serde(default = "default_sign_in_timeout_ms")]
    pub sign_in_timeout_ms: u64,

    /// Minimum interval between token-refresh diagnostics.
    #[serde(default = "default_token_refresh_log_interval_ms")]
    pub token_refresh_log_interval_ms: u64,

    /// Admin verification retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_init_settle_ms() -> u64 {
    400
}

fn default_init_timeout_ms() -> u64 {
    15_000
}

fn default_oauth_callback_retries() -> u32 {
    5
}

fn default_oauth_callback_retry_delay_ms() -> u64 {
    200
}

fn default_oauth_pending_clear_ms() -> u64 {
    5_000
}

fn default_visibility_settle_ms() -> u64 {
    300
}

fn default_sign_in_timeout_ms() -> u64 {
    15_000
}

fn default_token_refresh_log_interval_ms() -> u64 {
    60_000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            init_settle_ms: default_init_settle_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            oauth_callback_retries: default_oauth_callback_retries(),
            oauth_callback_retry_delay_ms: default_oauth_callback_retry_delay_ms(),
            oauth_pending_clear_ms: default_oauth_pending_clear_ms(),
            visibility_settle_ms: default_visibility_settle_ms(),
            reset_client_on_visible: false,
            sign_in_timeout_ms: default_sign_in_timeout_ms(),
            token_refresh_log_interval_ms: default_token_refresh_log_interval_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    #[must_use]
    pub fn oauth_callback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.oauth_callback_retry_delay_ms)
    }

    #[must_use]
    pub fn oauth_pending_clear(&self) -> Duration {
        Duration::from_millis(self.oauth_pending_clear_ms)
    }

    #[must_use]
    pub fn visibility_settle(&self) -> Duration {
        Duration::from_millis(self.visibility_settle_ms)
    }

    #[must_use]
    pub fn sign_in_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_in_timeout_ms)
    }

    #[must_use]
    pub fn token_refresh_log_interval(&self) -> Duration {
        Duration::from_millis(self.token_refresh_log_interval_ms)
    }
}
