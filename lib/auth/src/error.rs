//! Error types for the auth crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ProviderError`: failures talking to the identity provider
//! - `StorageError`: failures of the tab-scoped cache storage
//! - `ControllerError`: misuse of, or failures inside, the auth controller
//!
//! None of these reach auth-state consumers; the controller resolves every
//! failure to a non-privileged state and reports it to its diagnostic sink.

use std::fmt;

/// Errors from identity-provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider could not be reached.
    Unavailable { reason: String },
    /// The provider answered with an error status.
    Rejected { status: u16, reason: String },
    /// The provider's response could not be understood.
    InvalidResponse { reason: String },
    /// The request was cancelled by an overlapping newer request.
    Aborted,
    /// The operation needs a signed-in session.
    NotSignedIn,
    /// An OAuth callback URL carried an error or no tokens.
    Callback { reason: String },
}

impl ProviderError {
    /// Returns true for cancellations, which are expected under rapid
    /// re-triggering and are never logged.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => {
                write!(f, "identity provider unavailable: {reason}")
            }
            Self::Rejected { status, reason } => {
                write!(f, "identity provider rejected request ({status}): {reason}")
            }
            Self::InvalidResponse { reason } => {
                write!(f, "invalid identity provider response: {reason}")
            }
            Self::Aborted => write!(f, "request aborted"),
            Self::NotSignedIn => write!(f, "no signed-in session"),
            Self::Callback { reason } => {
                write!(f, "OAuth callback failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from cache storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The storage medium is not available.
    Unavailable { reason: String },
    /// Reading or writing an item failed.
    Io { key: String, reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "storage unavailable: {reason}"),
            Self::Io { key, reason } => write!(f, "storage item '{key}' failed: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors from the auth state controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// `start` was called on a controller that is already running.
    AlreadyStarted,
    /// A resolution step exceeded its time bound.
    Timeout { stage: &'static str, after_ms: u64 },
    /// An identity-provider call failed.
    Provider(ProviderError),
}

impl ControllerError {
    /// Returns true if the underlying failure is an abort.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_abort())
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "auth controller already started"),
            Self::Timeout { stage, after_ms } => {
                write!(f, "{stage} timed out after {after_ms}ms")
            }
            Self::Provider(e) => write!(f, "provider error: {e}"),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ProviderError> for ControllerError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}
