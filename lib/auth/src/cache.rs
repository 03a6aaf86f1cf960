//! Tab-scoped cache of positive admin confirmations.
//!
//! The cache only ever records "this user was confirmed admin". Negative and
//! inconclusive results are never stored, so every uncertain case goes back
//! to the server. Storage failures and malformed entries read as a miss.

use crate::error::StorageError;
use chrono::{DateTime, Duration, Utc};
use obsidian_log_core::{Clock, SystemClock, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Storage key of the cache entry.
pub const ADMIN_CACHE_KEY: &str = "obsidian-log-admin-cache";

/// How long a positive confirmation is trusted.
pub const ADMIN_CACHE_TTL_HOURS: i64 = 24;

/// A key/value store scoped to one browser tab or CLI state directory.
pub trait CacheStorage: Send + Sync + fmt::Debug {
    /// Reads an item.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes an item, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes an item. Removing a missing item is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage living as long as the process (one "tab").
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.items.lock().map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })
    }
}

impl CacheStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates storage rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(key: &str, e: &io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

impl CacheStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, &e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(key, &e))?;
        fs::write(self.path_for(key), value).map_err(|e| io_error(key, &e))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, &e)),
        }
    }
}

/// The persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AdminCacheEntry {
    user_id: UserId,
    is_admin: bool,
    cached_at: DateTime<Utc>,
}

/// Cache of positive admin confirmations.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone)]
pub struct AdminCache {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl AdminCache {
    /// Creates a cache over the given storage using the system clock.
    #[must_use]
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    /// Creates a cache over the given storage and clock.
    #[must_use]
    pub fn with_clock(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            ttl: Duration::hours(ADMIN_CACHE_TTL_HOURS),
        }
    }

    /// Creates a cache over fresh in-memory storage.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Overrides the time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true only for a stored, matching, unexpired positive entry.
    pub fn get(&self, user_id: &UserId) -> bool {
        let raw = match self.storage.get_item(ADMIN_CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                debug!(error = %e, "admin cache read failed, treating as miss");
                return false;
            }
        };

        let entry: AdminCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "malformed admin cache entry, treating as miss");
                return false;
            }
        };

        if &entry.user_id != user_id || !entry.is_admin {
            return false;
        }

        let age = self.clock.now() - entry.cached_at;
        age >= Duration::zero() && age < self.ttl
    }

    /// Records a positive confirmation. Negative results are ignored.
    pub fn set(&self, user_id: &UserId, is_admin: bool) {
        if !is_admin {
            return;
        }

        let entry = AdminCacheEntry {
            user_id: user_id.clone(),
            is_admin: true,
            cached_at: self.clock.now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "failed to encode admin cache entry");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(ADMIN_CACHE_KEY, &raw) {
            debug!(error = %e, "admin cache write failed");
        }
    }

    /// Removes any stored entry.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(ADMIN_CACHE_KEY) {
            debug!(error = %e, "admin cache clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsidian_log_core::ManualClock;

    #[derive(Debug)]
    struct BrokenStorage;

    impl CacheStorage for BrokenStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable {
                reason: "quota exceeded".to_string(),
            })
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                reason: "quota exceeded".to_string(),
            })
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                reason: "quota exceeded".to_string(),
            })
        }
    }

    fn cache_with_clock() -> (AdminCache, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = AdminCache::with_clock(storage.clone(), clock.clone());
        (cache, storage, clock)
    }

    #[test]
    fn empty_cache_misses() {
        let (cache, _, _) = cache_with_clock();
        assert!(!cache.get(&UserId::new("uid_1")));
    }

    #[test]
    fn positive_entry_hits_for_same_user_only() {
        let (cache, _, _) = cache_with_clock();
        cache.set(&UserId::new("uid_1"), true);

        assert!(cache.get(&UserId::new("uid_1")));
        assert!(!cache.get(&UserId::new("uid_2")));
    }

    #[test]
    fn negative_set_has_no_effect() {
        let (cache, storage, _) = cache_with_clock();
        cache.set(&UserId::new("uid_1"), false);

        assert!(!cache.get(&UserId::new("uid_1")));
        assert!(storage.get_item(ADMIN_CACHE_KEY).unwrap().is_none());
    }

    #[test]
    fn negative_set_does_not_overwrite_positive() {
        let (cache, _, _) = cache_with_clock();
        cache.set(&UserId::new("uid_1"), true);
        cache.set(&UserId::new("uid_1"), false);

        assert!(cache.get(&UserId::new("uid_1")));
    }

    #[test]
    fn positive_set_overwrites_previous_user() {
        let (cache, _, _) = cache_with_clock();
        cache.set(&UserId::new("uid_1"), true);
        cache.set(&UserId::new("uid_2"), true);

        assert!(!cache.get(&UserId::new("uid_1")));
        assert!(cache.get(&UserId::new("uid_2")));
    }

    #[test]
    fn entry_expires_at_ttl() {
        let (cache, _, clock) = cache_with_clock();
        let uid = UserId::new("uid_1");
        cache.set(&uid, true);

        clock.advance(Duration::hours(ADMIN_CACHE_TTL_HOURS) - Duration::milliseconds(1));
        assert!(cache.get(&uid));

        clock.advance(Duration::milliseconds(2));
        assert!(!cache.get(&uid));
    }

    #[test]
    fn entry_from_the_future_is_ignored() {
        let (cache, _, clock) = cache_with_clock();
        let uid = UserId::new("uid_1");
        cache.set(&uid, true);

        clock.advance(Duration::minutes(-5));
        assert!(!cache.get(&uid));
    }

    #[test]
    fn custom_ttl() {
        let (cache, _, clock) = cache_with_clock();
        let cache = cache.with_ttl(Duration::minutes(10));
        let uid = UserId::new("uid_1");
        cache.set(&uid, true);

        clock.advance(Duration::minutes(11));
        assert!(!cache.get(&uid));
    }

    #[test]
    fn clear_removes_entry() {
        let (cache, _, _) = cache_with_clock();
        let uid = UserId::new("uid_1");
        cache.set(&uid, true);
        cache.clear();

        assert!(!cache.get(&uid));
    }

    #[test]
    fn malformed_entry_is_a_miss() {
        let (cache, storage, _) = cache_with_clock();
        storage.set_item(ADMIN_CACHE_KEY, "{not json").unwrap();
        assert!(!cache.get(&UserId::new("uid_1")));

        storage
            .set_item(
                ADMIN_CACHE_KEY,
                r#"{"user_id":"uid_1","is_admin":false,"cached_at":"2026-01-01T00:00:00Z"}"#,
            )
            .unwrap();
        assert!(!cache.get(&UserId::new("uid_1")));
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let cache = AdminCache::new(Arc::new(BrokenStorage));
        let uid = UserId::new("uid_1");

        cache.set(&uid, true);
        cache.clear();
        assert!(!cache.get(&uid));
    }

    #[test]
    fn clones_share_storage() {
        let (cache, _, _) = cache_with_clock();
        let other = cache.clone();
        cache.set(&UserId::new("uid_1"), true);

        assert!(other.get(&UserId::new("uid_1")));
    }

    #[test]
    fn file_storage_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("state"));

        assert!(storage.get_item("k").unwrap().is_none());
        storage.set_item("k", "v1").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v1"));
        storage.remove_item("k").unwrap();
        assert!(storage.get_item("k").unwrap().is_none());
        storage.remove_item("k").unwrap();
    }

    #[test]
    fn file_backed_cache_survives_new_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uid = UserId::new("uid_1");

        AdminCache::new(Arc::new(FileStorage::new(dir.path()))).set(&uid, true);
        let reopened = AdminCache::new(Arc::new(FileStorage::new(dir.path())));
        assert!(reopened.get(&uid));

        reopened.clear();
        assert!(!reopened.get(&uid));
    }
}
