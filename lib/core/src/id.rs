//! Strongly-typed identifiers for domain entities.
//!
//! User identifiers are issued by the identity provider and are opaque to
//! this platform, so they are carried as strings rather than parsed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an authenticated user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID from the provider-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the user ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_display() {
        let id = UserId::new("0b6a1c9e-5f3d-4e8a-9c1b-2d7f4a6e8b10");
        assert_eq!(id.to_string(), "0b6a1c9e-5f3d-4e8a-9c1b-2d7f4a6e8b10");
    }

    #[test]
    fn user_id_from_str_and_string() {
        let a: UserId = "uid_1".into();
        let b: UserId = "uid_1".to_string().into();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "uid_1");
    }

    #[test]
    fn user_id_empty() {
        assert!(UserId::new("").is_empty());
        assert!(!UserId::new("x").is_empty());
    }

    #[test]
    fn user_id_serializes_transparently() {
        let id = UserId::new("uid_42");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"uid_42\"");
        let parsed: UserId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }

    #[test]
    fn user_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(UserId::new("a"));
        set.insert(UserId::new("b"));
        set.insert(UserId::new("a"));
        assert_eq!(set.len(), 2);
    }
}
