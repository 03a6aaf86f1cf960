//! Supabase project configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for a Supabase project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,

    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,

    /// Sessions expiring within this many seconds are refreshed before
    /// being handed out.
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: i64,
}

fn default_refresh_margin_seconds() -> i64 {
    60
}

impl SupabaseConfig {
    /// Creates a configuration with the default refresh margin.
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            refresh_margin_seconds: default_refresh_margin_seconds(),
        }
    }

    /// Returns true if both the URL and the anon key are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_margin_defaults_to_one_minute() {
        let config: SupabaseConfig =
            serde_json::from_str(r#"{"url": "https://abcd.supabase.co", "anon_key": "anon"}"#)
                .expect("deserialize");
        assert_eq!(config.refresh_margin_seconds, 60);
        assert!(config.is_configured());
    }

    #[test]
    fn blank_values_are_not_configured() {
        assert!(!SupabaseConfig::new("", "anon").is_configured());
        assert!(!SupabaseConfig::new("https://abcd.supabase.co", "  ").is_configured());
    }
}
