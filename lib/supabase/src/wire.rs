//! GoTrue and PostgREST payloads.

use chrono::{DateTime, Duration, Utc};
use obsidian_log_auth::{ProviderError, Session, User};
use serde::Deserialize;

/// Response of the token and callback endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub provider_token: Option<String>,
    pub user: GoTrueUser,
}

impl TokenResponse {
    pub(crate) fn into_session(self, now: DateTime<Utc>) -> Result<Session, ProviderError> {
        let expires_at =
            expiry(now, self.expires_at, self.expires_in).ok_or(ProviderError::InvalidResponse {
                reason: "token response carries no expiry".to_string(),
            })?;
        Ok(Session::new(self.user.into_user(), self.access_token, expires_at)
            .with_refresh_token(self.refresh_token)
            .with_provider_token(self.provider_token))
    }
}

/// A GoTrue user object.
#[derive(Debug, Deserialize)]
pub(crate) struct GoTrueUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Metadata copied from the upstream GitHub account.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserMetadata {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl GoTrueUser {
    pub(crate) fn into_user(self) -> User {
        let UserMetadata {
            user_name,
            user_login,
            login,
            preferred_username,
            avatar_url,
        } = self.user_metadata;
        let username = user_name.or(user_login).or(login).or(preferred_username);
        User::new(self.id)
            .with_email(self.email)
            .with_github_username(username)
            .with_avatar_url(avatar_url)
    }
}

/// Absolute expiry wins over a relative one. Out-of-range values read as
/// no expiry.
pub(crate) fn expiry(
    now: DateTime<Utc>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
) -> Option<DateTime<Utc>> {
    expires_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| {
            expires_in
                .and_then(Duration::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta))
        })
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Extracts a human-readable reason from an error response body.
pub(crate) fn error_reason(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no details".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_maps_github_metadata() {
        let raw = r#"{
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": {
                "id": "uid_1",
                "email": "a@example.com",
                "user_metadata": {"user_name": "octocat", "avatar_url": "https://avatars.example/1"}
            }
        }"#;
        let now = Utc::now();
        let session = serde_json::from_str::<TokenResponse>(raw)
            .expect("deserialize")
            .into_session(now)
            .expect("session");

        assert_eq!(session.user_id().as_str(), "uid_1");
        assert_eq!(session.user().github_username(), Some("octocat"));
        assert_eq!(session.refresh_token(), Some("rt"));
        assert_eq!(session.expires_at(), now + Duration::seconds(3600));
    }

    #[test]
    fn preferred_username_is_a_fallback() {
        let user: GoTrueUser = serde_json::from_str(
            r#"{"id": "uid_1", "user_metadata": {"preferred_username": "octo"}}"#,
        )
        .expect("deserialize");
        assert_eq!(user.into_user().github_username(), Some("octo"));
    }

    #[test]
    fn username_keys_are_tried_in_order() {
        for (metadata, expected) in [
            (r#"{"user_name": "a", "user_login": "b", "login": "c"}"#, "a"),
            (r#"{"user_login": "octo"}"#, "octo"),
            (r#"{"login": "octo"}"#, "octo"),
            (r#"{"login": "octo", "preferred_username": "other"}"#, "octo"),
        ] {
            let user: GoTrueUser = serde_json::from_str(&format!(
                r#"{{"id": "uid_1", "user_metadata": {metadata}}}"#
            ))
            .expect("deserialize");
            assert_eq!(user.into_user().github_username(), Some(expected), "{metadata}");
        }
    }

    #[test]
    fn oversized_lifetimes_have_no_expiry() {
        let now = Utc::now();
        assert_eq!(expiry(now, None, Some(i64::MAX)), None);
        assert_eq!(expiry(now, None, Some(99_999_999_999_999)), None);
        assert_eq!(expiry(now, None, Some(i64::MIN)), None);
    }

    #[test]
    fn oversized_token_lifetime_is_invalid() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "at", "expires_in": 99999999999999, "user": {"id": "uid_1"}}"#,
        )
        .expect("deserialize");
        assert!(matches!(
            response.into_session(Utc::now()),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn absolute_expiry_wins() {
        let now = Utc::now();
        let at = expiry(now, Some(4_102_444_800), Some(10)).expect("expiry");
        assert_eq!(at.timestamp(), 4_102_444_800);
        assert_eq!(expiry(now, None, None), None);
    }

    #[test]
    fn missing_expiry_is_invalid() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "at", "user": {"id": "uid_1"}}"#)
                .expect("deserialize");
        assert!(matches!(
            response.into_session(Utc::now()),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn error_reason_prefers_description() {
        assert_eq!(
            error_reason(r#"{"error": "invalid_grant", "error_description": "Refresh Token Not Found"}"#),
            "Refresh Token Not Found"
        );
        assert_eq!(error_reason(r#"{"msg": "bad jwt"}"#), "bad jwt");
        assert_eq!(error_reason("upstream down"), "upstream down");
        assert_eq!(error_reason(""), "no details");
    }
}
