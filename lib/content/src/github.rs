//! GitHub Contents API client.
//!
//! The repository is the content database: every read is a `GET` on
//! `/repos/<owner>/<repo>/contents/<path>` and every write is a commit made
//! through `PUT`/`DELETE` on the same path, guarded by the file's blob SHA.

use crate::error::{GitHubError, StoreError};
use crate::repo::RepoRef;
use crate::store::{VersionedStore, WriteRequest};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rootcause::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Public GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com/";

const RAW_CONTENT_PREFIX: &str = "https://raw.githubusercontent.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = concat!("obsidian-log/", env!("CARGO_PKG_VERSION"));

/// Branches tried, in order, after the default branch when looking up a SHA.
const FALLBACK_BRANCHES: [&str; 2] = ["main", "master"];

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Many(Vec<ContentItem>),
    One(ContentItem),
}

impl ContentsResponse {
    fn into_items(self) -> Vec<ContentItem> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
}

/// A file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub download_url: String,
}

fn transport(e: reqwest::Error) -> GitHubError {
    GitHubError::Transport {
        reason: e.to_string(),
    }
}

async fn status_error(response: Response) -> GitHubError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    GitHubError::Status {
        status: status.as_u16(),
        message,
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, GitHubError> {
    response
        .json::<T>()
        .await
        .map_err(|e| GitHubError::InvalidResponse {
            reason: e.to_string(),
        })
}

fn decode_base64(content: &str) -> Result<String, GitHubError> {
    // GitHub wraps base64 content at 60 columns.
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::InvalidResponse {
            reason: format!("invalid base64 content: {e}"),
        })?;
    String::from_utf8(bytes).map_err(|e| GitHubError::InvalidResponse {
        reason: format!("content is not UTF-8: {e}"),
    })
}

/// Client for the GitHub Contents API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a client for api.github.com.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: Option<String>) -> Result<Self, Report<GitHubError>> {
        Self::with_api_base(GITHUB_API, token)
    }

    /// Creates a client for another API endpoint, such as GitHub Enterprise.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn with_api_base(api_base: &str, token: Option<String>) -> Result<Self, Report<GitHubError>> {
        let mut api_base = Url::parse(api_base).map_err(|e| GitHubError::InvalidResponse {
            reason: format!("invalid API base '{api_base}': {e}"),
        })?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            api_base,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Returns true if requests are authenticated.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Lists the files (not subdirectories) of a directory.
    ///
    /// A missing directory is empty.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an unexpected status.
    pub async fn fetch_directory(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> obsidian_log_core::Result<Vec<DirectoryEntry>, GitHubError> {
        let response = self.get_contents(repo, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await.into());
        }

        let listing: ContentsResponse = parse_json(response).await?;
        Ok(listing
            .into_items()
            .into_iter()
            .filter(|item| item.kind == "file")
            .filter_map(|item| {
                item.download_url.map(|download_url| DirectoryEntry {
                    name: item.name,
                    download_url,
                })
            })
            .collect())
    }

    /// Reads a text file. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an unexpected status or
    /// undecodable content.
    pub async fn fetch_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> obsidian_log_core::Result<Option<String>, GitHubError> {
        Ok(self.file_content(repo, path).await?)
    }

    /// Returns the blob SHA of a file, trying the default branch, then
    /// `main`, then `master`. `None` if none of them has the file.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn file_sha(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> obsidian_log_core::Result<Option<String>, GitHubError> {
        Ok(self.sha(repo, path).await?)
    }

    /// Creates or replaces a file with a commit.
    ///
    /// # Errors
    ///
    /// Returns `Status` with GitHub's message if the write is rejected.
    pub async fn put_file(
        &self,
        repo: &RepoRef,
        path: &str,
        request: &WriteRequest,
    ) -> obsidian_log_core::Result<(), GitHubError> {
        Ok(self.put(repo, path, request).await?)
    }

    /// Deletes a file with a commit.
    ///
    /// # Errors
    ///
    /// Returns `Status` with GitHub's message if the delete is rejected.
    #[instrument(skip(self, message), fields(repo = %repo))]
    pub async fn delete_file(
        &self,
        repo: &RepoRef,
        path: &str,
        message: &str,
        sha: &str,
    ) -> obsidian_log_core::Result<(), GitHubError> {
        let url = self.contents_url(repo, path);
        let response = self
            .request(Method::DELETE, url)
            .json(&DeleteBody { message, sha })
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await.into());
        }
        Ok(())
    }

    /// Fetches a raw file from `raw.githubusercontent.com`.
    ///
    /// # Errors
    ///
    /// Returns `RejectedUrl` for any other host, or an error on transport
    /// failure.
    pub async fn fetch_raw_file(
        &self,
        download_url: &str,
    ) -> obsidian_log_core::Result<Option<String>, GitHubError> {
        if !download_url.starts_with(RAW_CONTENT_PREFIX) {
            return Err(GitHubError::RejectedUrl {
                url: download_url.to_string(),
            }
            .into());
        }
        Ok(self.download(download_url).await?)
    }

    async fn file_content(&self, repo: &RepoRef, path: &str) -> Result<Option<String>, GitHubError> {
        let response = self.get_contents(repo, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let ContentsResponse::One(item) = parse_json::<ContentsResponse>(response).await? else {
            return Err(GitHubError::InvalidResponse {
                reason: format!("{path} is a directory"),
            });
        };

        match (item.encoding.as_deref(), item.content.as_deref()) {
            (Some("base64"), Some(content)) if !content.is_empty() => {
                decode_base64(content).map(Some)
            }
            _ => match item.download_url {
                Some(url) => self.download(&url).await,
                None => Ok(None),
            },
        }
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn sha(&self, repo: &RepoRef, path: &str) -> Result<Option<String>, GitHubError> {
        let refs = std::iter::once(None).chain(FALLBACK_BRANCHES.iter().copied().map(Some));
        for git_ref in refs {
            let response = self.get_contents(repo, path, git_ref).await?;
            if !response.status().is_success() {
                debug!(?git_ref, status = %response.status(), "no SHA on ref");
                continue;
            }
            let sha = parse_json::<ContentsResponse>(response)
                .await
                .ok()
                .and_then(|listing| listing.into_items().into_iter().next())
                .and_then(|item| item.sha);
            if sha.is_some() {
                return Ok(sha);
            }
        }
        Ok(None)
    }

    #[instrument(skip(self, request), fields(repo = %repo, message = %request.message))]
    async fn put(&self, repo: &RepoRef, path: &str, request: &WriteRequest) -> Result<(), GitHubError> {
        let url = self.contents_url(repo, path);
        let body = PutBody {
            message: &request.message,
            content: request.content.to_base64(),
            sha: request.version.as_deref(),
        };
        let response = self
            .request(Method::PUT, url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Option<String>, GitHubError> {
        let url = Url::parse(url).map_err(|e| GitHubError::InvalidResponse {
            reason: format!("invalid download URL: {e}"),
        })?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Ok(None);
        }
        response.text().await.map(Some).map_err(transport)
    }

    async fn get_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Response, GitHubError> {
        let mut url = self.contents_url(repo, path);
        if let Some(git_ref) = git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        self.request(Method::GET, url)
            .send()
            .await
            .map_err(transport)
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner(), repo.repo(), "contents"])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// A repository viewed as a versioned store.
#[derive(Debug, Clone)]
pub struct GitHubStore {
    client: GitHubClient,
    repo: RepoRef,
}

impl GitHubStore {
    #[must_use]
    pub fn new(client: GitHubClient, repo: RepoRef) -> Self {
        Self { client, repo }
    }

    #[must_use]
    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }
}

#[async_trait]
impl VersionedStore for GitHubStore {
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.client.file_content(&self.repo, path).await?)
    }

    async fn current_version(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.client.sha(&self.repo, path).await?)
    }

    async fn write(&self, path: &str, request: WriteRequest) -> Result<(), StoreError> {
        Ok(self.client.put(&self.repo, path, &request).await?)
    }
}
