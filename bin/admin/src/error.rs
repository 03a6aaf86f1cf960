//! CLI error type.

use std::fmt;

/// Errors surfaced to the operator.
#[derive(Debug)]
pub enum CliError {
    /// Environment configuration is missing or invalid.
    Config { reason: String },
    /// The Supabase client could not be created or a call failed.
    Supabase { reason: String },
    /// The auth controller failed.
    Auth { reason: String },
    /// A command needs a signed-in user.
    NotSignedIn,
    /// A command needs an administrator.
    NotAdmin,
    /// The content repository could not be used.
    Content { reason: String },
    /// Reading input failed.
    Io { reason: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
            Self::Supabase { reason } => write!(f, "supabase error: {reason}"),
            Self::Auth { reason } => write!(f, "auth error: {reason}"),
            Self::NotSignedIn => write!(f, "not signed in; run `obsidian-log-admin login` first"),
            Self::NotAdmin => write!(f, "the signed-in user is not an administrator"),
            Self::Content { reason } => write!(f, "content error: {reason}"),
            Self::Io { reason } => write!(f, "I/O error: {reason}"),
        }
    }
}

impl std::error::Error for CliError {}
