//! Diagnostic reporting for the auth flow.
//!
//! Nothing the controller reports is user-visible. Whether it is logged at
//! all is decided by the sink: production wires `SilentSink`, development
//! wires `TracingSink`.

use chrono::{DateTime, Utc};
use std::fmt;

/// Something worth telling a developer about.
#[derive(Debug)]
pub enum DiagnosticEvent<'a> {
    /// A step failed and was resolved to a safe state.
    Failure {
        stage: &'static str,
        error: &'a (dyn std::error::Error + Send + Sync),
    },
    /// The provider refreshed the access token.
    TokenRefreshed { expires_at: Option<DateTime<Utc>> },
    /// A background task ended abnormally.
    TaskFailed { reason: String },
}

/// Receives diagnostic events.
pub trait DiagnosticSink: Send + Sync + fmt::Debug {
    /// Reports an event.
    fn report(&self, event: DiagnosticEvent<'_>);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn report(&self, _event: DiagnosticEvent<'_>) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, event: DiagnosticEvent<'_>) {
        match event {
            DiagnosticEvent::Failure { stage, error } => {
                tracing::warn!(stage, error = %error, "auth step failed");
            }
            DiagnosticEvent::TokenRefreshed { expires_at } => {
                tracing::info!(?expires_at, "access token refreshed");
            }
            DiagnosticEvent::TaskFailed { reason } => {
                tracing::warn!(%reason, "auth task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn sinks_accept_every_event() {
        let error = ProviderError::NotSignedIn;
        for sink in [&SilentSink as &dyn DiagnosticSink, &TracingSink] {
            sink.report(DiagnosticEvent::Failure {
                stage: "session init",
                error: &error,
            });
            sink.report(DiagnosticEvent::TokenRefreshed {
                expires_at: Some(Utc::now()),
            });
            sink.report(DiagnosticEvent::TaskFailed {
                reason: "panicked".to_string(),
            });
        }
    }
}
