//! Errors raised while constructing a Supabase client.
//!
//! Request-time failures use the auth crate's `ProviderError` so the client
//! can sit behind the `IdentityProvider` seam.

use std::fmt;

/// Errors from client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupabaseError {
    /// URL or anon key missing.
    NotConfigured,
    /// The project URL could not be parsed.
    InvalidUrl { url: String, reason: String },
    /// The HTTP client could not be built.
    Http { reason: String },
}

impl fmt::Display for SupabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Supabase URL and anon key are required"),
            Self::InvalidUrl { url, reason } => {
                write!(f, "invalid Supabase URL '{url}': {reason}")
            }
            Self::Http { reason } => write!(f, "failed to build HTTP client: {reason}"),
        }
    }
}

impl std::error::Error for SupabaseError {}
