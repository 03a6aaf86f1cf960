//! Versioned file stores and the optimistic-concurrency writer.
//!
//! Every file carries an opaque version token (a blob SHA on GitHub). A
//! write names the version it replaces; the store rejects it with a
//! conflict if the file moved on in between. `write_with_retry` re-reads the
//! version and tries again, a bounded number of times.

use crate::error::StoreError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

/// Attempts made by `write_with_retry` callers that have no reason to differ.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;

/// File content as handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// UTF-8 text, encoded by the store.
    Text(String),
    /// Already base64-encoded bytes, such as an uploaded image.
    Base64(String),
}

impl FileContent {
    /// Returns the content base64-encoded.
    #[must_use]
    pub fn to_base64(&self) -> String {
        match self {
            Self::Text(text) => BASE64_STANDARD.encode(text.as_bytes()),
            Self::Base64(encoded) => encoded.clone(),
        }
    }
}

/// A write of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Commit message.
    pub message: String,
    pub content: FileContent,
    /// Version being replaced; `None` creates the file.
    pub version: Option<String>,
}

/// A file store with per-file version tokens.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Reads a text file. `None` if it does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Returns the file's current version token. `None` if it does not exist.
    async fn current_version(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Writes a file, failing with `Conflict` on a stale version.
    async fn write(&self, path: &str, request: WriteRequest) -> Result<(), StoreError>;
}

/// Writes `content` to `path`, retrying version conflicts.
///
/// Each attempt fetches the current version first. Errors other than a
/// conflict end the loop immediately; the last conflict is returned once
/// `max_attempts` are used up.
///
/// # Errors
///
/// Returns the store's error.
pub async fn write_with_retry(
    store: &dyn VersionedStore,
    path: &str,
    content: FileContent,
    message: &str,
    max_attempts: u32,
) -> obsidian_log_core::Result<(), StoreError> {
    Ok(write_with_retry_inner(store, path, content, message, max_attempts).await?)
}

#[instrument(skip(store, content, message))]
pub(crate) async fn write_with_retry_inner(
    store: &dyn VersionedStore,
    path: &str,
    content: FileContent,
    message: &str,
    max_attempts: u32,
) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        let version = store.current_version(path).await?;
        let request = WriteRequest {
            message: message.to_string(),
            content: content.clone(),
            version,
        };

        match store.write(path, request).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                debug!(attempt, error = %e, "version conflict, retrying with fresh version");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, StoredFile>,
    next_version: u64,
    pending_conflicts: usize,
    writes: Vec<WriteRequest>,
}

/// In-memory versioned store for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a text file.
    pub fn insert(&self, path: &str, content: &str) {
        let mut state = self.lock();
        let version = state.bump();
        state.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                version,
            },
        );
    }

    /// Makes the next `count` writes lose a race against another writer.
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().pending_conflicts = count;
    }

    /// Every write attempted, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRequest> {
        self.lock().writes.clone()
    }

    /// Returns the stored text of a file.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).map(|file| file.content.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

fn version_token(version: u64) -> String {
    format!("{version:040x}")
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(path))
    }

    async fn current_version(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()
            .files
            .get(path)
            .map(|file| version_token(file.version)))
    }

    async fn write(&self, path: &str, request: WriteRequest) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.writes.push(request.clone());

        if state.pending_conflicts > 0 {
            // Another writer got there first.
            state.pending_conflicts -= 1;
            let version = state.bump();
            let content = state
                .files
                .get(path)
                .map(|file| file.content.clone())
                .unwrap_or_default();
            state
                .files
                .insert(path.to_string(), StoredFile { content, version });
        }

        let current = state.files.get(path).map(|file| version_token(file.version));
        match (&current, &request.version) {
            (Some(_), None) => {
                return Err(StoreError::from_rejection(
                    422,
                    "Invalid request.\n\n\"sha\" wasn't supplied.".to_string(),
                ));
            }
            (Some(current), Some(expected)) if current != expected => {
                return Err(StoreError::from_rejection(
                    409,
                    format!("{path} does not match {expected}"),
                ));
            }
            _ => {}
        }

        let content = match request.content {
            FileContent::Text(text) => text,
            FileContent::Base64(encoded) => encoded,
        };
        let version = state.bump();
        state
            .files
            .insert(path.to_string(), StoredFile { content, version });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_is_base64_encoded() {
        assert_eq!(FileContent::Text("hi".to_string()).to_base64(), "aGk=");
        assert_eq!(FileContent::Base64("aGk=".to_string()).to_base64(), "aGk=");
    }

    #[tokio::test]
    async fn first_write_succeeds_without_retry() {
        let store = MemoryStore::new();
        store.insert("config.json", "{}");

        write_with_retry_inner(
            &store,
            "config.json",
            FileContent::Text("{\"a\":1}".to_string()),
            "update",
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await
        .expect("written");

        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.get("config.json").as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn creating_a_file_sends_no_version() {
        let store = MemoryStore::new();

        write_with_retry_inner(
            &store,
            "new.json",
            FileContent::Text("{}".to_string()),
            "create",
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await
        .expect("written");

        assert_eq!(store.writes()[0].version, None);
    }

    #[tokio::test]
    async fn conflicts_are_retried_with_fresh_version() {
        let store = MemoryStore::new();
        store.insert("config.json", "{}");
        store.inject_conflicts(2);

        write_with_retry_inner(
            &store,
            "config.json",
            FileContent::Text("new".to_string()),
            "update",
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await
        .expect("third attempt wins");

        let writes = store.writes();
        assert_eq!(writes.len(), 3);
        assert_ne!(writes[0].version, writes[2].version);
        assert_eq!(store.get("config.json").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        store.insert("config.json", "{}");
        store.inject_conflicts(5);

        let result = write_with_retry_inner(
            &store,
            "config.json",
            FileContent::Text("new".to_string()),
            "update",
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.writes().len(), 3);
        assert_eq!(store.get("config.json").as_deref(), Some("{}"));
    }

    struct ForbiddenStore;

    #[async_trait]
    impl VersionedStore for ForbiddenStore {
        async fn read(&self, _path: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn current_version(&self, _path: &str) -> Result<Option<String>, StoreError> {
            Ok(Some("abc".to_string()))
        }

        async fn write(&self, _path: &str, _request: WriteRequest) -> Result<(), StoreError> {
            Err(StoreError::from_rejection(403, "Forbidden".to_string()))
        }
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let result = write_with_retry(
            &ForbiddenStore,
            "config.json",
            FileContent::Text("new".to_string()),
            "update",
            DEFAULT_WRITE_ATTEMPTS,
        )
        .await;

        assert!(result.is_err());
    }
}
