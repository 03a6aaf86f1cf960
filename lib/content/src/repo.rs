//! GitHub repository references.

use crate::error::GitHubError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static REPO_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([A-Za-z0-9_-]+)/([A-Za-z0-9_.-]+)/?$")
        .expect("repository URL regex is valid")
});

/// An `<owner>/<repo>` pair on github.com.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    owner: String,
    repo: String,
}

impl RepoRef {
    /// Creates a reference without validation.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `https://github.com/<owner>/<repo>` with an optional trailing slash.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRepoUrl` for anything else.
    pub fn parse(url: &str) -> Result<Self, GitHubError> {
        let captures = REPO_URL_REGEX
            .captures(url)
            .ok_or_else(|| GitHubError::InvalidRepoUrl {
                url: url.to_string(),
            })?;
        Ok(Self::new(&captures[1], &captures[2]))
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Returns the `raw.githubusercontent.com` URL of a file on `branch`.
    #[must_use]
    pub fn raw_url(&self, branch: &str, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{branch}/{path}",
            self.owner, self.repo
        )
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://github.com/{}/{}", self.owner, self.repo)
    }
}

/// Returns true for a well-formed GitHub repository URL.
#[must_use]
pub fn is_valid_repo_url(url: &str) -> bool {
    REPO_URL_REGEX.is_match(url)
}
