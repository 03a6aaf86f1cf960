//! Error types for the content crate.
//!
//! - `GitHubError`: failures of the GitHub Contents API client
//! - `StoreError`: failures of a versioned store, with version conflicts
//!   separated out so writers can retry them
//! - `ContentError`: failures of the site configuration service

use std::fmt;

/// Errors from the GitHub client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubError {
    /// Not a `https://github.com/<owner>/<repo>` URL.
    InvalidRepoUrl { url: String },
    /// Raw file URLs must point at `raw.githubusercontent.com`.
    RejectedUrl { url: String },
    /// The request did not complete.
    Transport { reason: String },
    /// GitHub answered with an error status.
    Status { status: u16, message: String },
    /// The response body could not be understood.
    InvalidResponse { reason: String },
}

impl fmt::Display for GitHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRepoUrl { url } => write!(f, "invalid GitHub repository URL: {url}"),
            Self::RejectedUrl { url } => write!(f, "refusing to fetch non-GitHub URL: {url}"),
            Self::Transport { reason } => write!(f, "GitHub request failed: {reason}"),
            Self::Status { status, message } => {
                write!(f, "GitHub returned {status}: {message}")
            }
            Self::InvalidResponse { reason } => write!(f, "invalid GitHub response: {reason}"),
        }
    }
}

impl std::error::Error for GitHubError {}

/// Errors from a versioned store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The version token did not match the stored file.
    Conflict { message: String },
    /// The store refused the write for another reason.
    Rejected { status: u16, message: String },
    /// The store could not be reached or answered nonsense.
    Backend { reason: String },
}

impl StoreError {
    /// Classifies a rejected write.
    #[must_use]
    pub fn from_rejection(status: u16, message: String) -> Self {
        if status == 409 || is_version_conflict(&message) {
            Self::Conflict { message }
        } else {
            Self::Rejected { status, message }
        }
    }

    /// Returns true for version-token mismatches.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Returns true if a GitHub error message reports a stale or missing SHA.
#[must_use]
pub fn is_version_conflict(message: &str) -> bool {
    message.contains("wasn't supplied")
        || (message.contains("is at") && message.contains("but expected"))
        || message.contains("does not match")
}

impl From<GitHubError> for StoreError {
    fn from(e: GitHubError) -> Self {
        match e {
            GitHubError::Status { status, message } => Self::from_rejection(status, message),
            other => Self::Backend {
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { message } => write!(f, "version conflict: {message}"),
            Self::Rejected { status, message } => write!(f, "write rejected ({status}): {message}"),
            Self::Backend { reason } => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the site configuration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// The actor's account carries no GitHub username.
    MissingGitHubUsername,
    /// The actor is not listed in the configuration's admins.
    NotAdmin { username: String },
    /// Author icons must be png, jpg, jpeg, gif or webp.
    UnsupportedIconType { extension: String },
    /// The uploaded icon is not valid base64.
    InvalidIcon { reason: String },
    /// The configuration could not be serialized.
    Encode { reason: String },
    /// Writing to the store failed.
    Store(StoreError),
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingGitHubUsername => write!(f, "account has no GitHub username"),
            Self::NotAdmin { username } => write!(f, "'{username}' is not an administrator"),
            Self::UnsupportedIconType { extension } => write!(
                f,
                "unsupported icon type '{extension}' (png, jpg, jpeg, gif, webp only)"
            ),
            Self::InvalidIcon { reason } => write!(f, "invalid icon data: {reason}"),
            Self::Encode { reason } => write!(f, "failed to encode configuration: {reason}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ContentError {}

impl From<StoreError> for ContentError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_sha_messages_are_conflicts() {
        for message in [
            "Invalid request.\n\n\"sha\" wasn't supplied.",
            "config.json is at 3f2a but expected 9b1c",
            "config.json does not match 9b1c",
        ] {
            assert!(is_version_conflict(message), "{message}");
            assert!(StoreError::from_rejection(422, message.to_string()).is_conflict());
        }
    }

    #[test]
    fn status_409_is_a_conflict() {
        assert!(StoreError::from_rejection(409, "Conflict".to_string()).is_conflict());
    }

    #[test]
    fn other_rejections_are_not_conflicts() {
        assert!(!is_version_conflict("is at the limit"));
        assert_eq!(
            StoreError::from_rejection(403, "Resource not accessible by integration".to_string()),
            StoreError::Rejected {
                status: 403,
                message: "Resource not accessible by integration".to_string()
            }
        );
    }

    #[test]
    fn transport_failures_are_backend_errors() {
        let e: StoreError = GitHubError::Transport {
            reason: "connection reset".to_string(),
        }
        .into();
        assert!(matches!(e, StoreError::Backend { .. }));
    }
}
