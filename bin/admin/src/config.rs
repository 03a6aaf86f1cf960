//! Centralized CLI configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`SUPABASE__URL`, `AUTH__INIT_TIMEOUT_MS`, ...).

use obsidian_log_auth::{AuthConfig, DiagnosticSink, SilentSink, TracingSink};
use obsidian_log_supabase::SupabaseConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    /// Supabase project used for sign-in and the admin allow-list.
    pub supabase: SupabaseConfig,

    /// Content repository settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Auth flow timings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Directory holding the persisted session and admin cache.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Where the OAuth provider sends the browser after sign-in.
    #[serde(default = "default_redirect_to")]
    pub redirect_to: String,

    /// Local content checkout whose `.obsidian-log/config.json` mirrors the
    /// published configuration.
    #[serde(default)]
    pub content_dir: Option<PathBuf>,

    #[serde(default)]
    pub mode: Mode,
}

/// Content repository settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// `https://github.com/<owner>/<repo>` holding the site content.
    #[serde(default)]
    pub repo_url: String,

    /// Token used for commits when the session carries no provider token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Deployment mode. Development surfaces auth diagnostics in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".obsidian-log")
}

fn default_redirect_to() -> String {
    "http://localhost:3000/admin".to_string()
}

impl AdminConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// The diagnostic sink for this mode.
    #[must_use]
    pub fn diagnostics(&self) -> Arc<dyn DiagnosticSink> {
        match self.mode {
            Mode::Development => Arc::new(TracingSink),
            Mode::Production => Arc::new(SilentSink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AdminConfig, config::ConfigError> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AdminConfig::from_environment(config::Environment::default().source(Some(source)))
    }

    #[test]
    fn defaults_apply_when_only_supabase_is_set() {
        let config = load(&[
            ("SUPABASE__URL", "https://abcd.supabase.co"),
            ("SUPABASE__ANON_KEY", "anon"),
        ])
        .expect("config");

        assert_eq!(config.supabase.url, "https://abcd.supabase.co");
        assert_eq!(config.supabase.refresh_margin_seconds, 60);
        assert_eq!(config.auth, AuthConfig::default());
        assert_eq!(config.state_dir, PathBuf::from(".obsidian-log"));
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.github.token, None);
    }

    #[test]
    fn nested_values_are_parsed() {
        let config = load(&[
            ("SUPABASE__URL", "https://abcd.supabase.co"),
            ("SUPABASE__ANON_KEY", "anon"),
            ("GITHUB__REPO_URL", "https://github.com/octocat/blog"),
            ("GITHUB__TOKEN", "ghp_x"),
            ("AUTH__INIT_TIMEOUT_MS", "30000"),
            ("AUTH__RESET_CLIENT_ON_VISIBLE", "true"),
            ("MODE", "development"),
        ])
        .expect("config");

        assert_eq!(config.github.repo_url, "https://github.com/octocat/blog");
        assert_eq!(config.github.token.as_deref(), Some("ghp_x"));
        assert_eq!(config.auth.init_timeout_ms, 30_000);
        assert!(config.auth.reset_client_on_visible);
        assert_eq!(config.mode, Mode::Development);
    }

    #[test]
    fn missing_supabase_is_an_error() {
        assert!(load(&[("MODE", "development")]).is_err());
    }
}
