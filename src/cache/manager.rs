//! Response cache for persisting API responses to disk
//!
//! Provides a `ResponseCache` that stores JSON payloads in one file per
//! derived key, with a uniform TTL and lazy deletion of expired entries.
//! Every storage failure degrades to a cache miss (on read) or a dropped
//! write (on write); nothing here returns an error to the caller.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::key::CacheKey;

/// Default time-to-live for cache entries (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Counter used to give concurrent writers distinct temp files
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk representation of a cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// When the entry was written
    timestamp: DateTime<Utc>,
    /// The cached payload, never interpreted by the cache
    data: T,
}

/// Shared on/off switch for a [`ResponseCache`]
///
/// Clones share the same flag, so a long-running process can flip caching
/// on or off and every cache holding the switch sees it on its next call.
#[derive(Debug, Clone)]
pub struct CacheSwitch(Arc<AtomicBool>);

impl CacheSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

impl Default for CacheSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A value produced through [`ResponseCache::fetch_or_insert`]
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    /// Whether the value came from disk rather than a fresh fetch
    pub from_cache: bool,
}

/// Best-effort, file-backed cache for named API calls
///
/// Entries live in `<cache_dir>/<key>.json` as `{"timestamp": ..., "data": ...}`.
/// An entry older than the TTL is deleted by the first read that notices it;
/// the cache never scans for expired entries on its own.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Maximum entry age
    ttl: Duration,
    switch: CacheSwitch,
}

impl ResponseCache {
    /// Creates an enabled cache rooted at `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_switch(cache_dir, ttl, CacheSwitch::default())
    }

    /// Creates a cache controlled by an existing switch
    pub fn with_switch(cache_dir: impl Into<PathBuf>, ttl: Duration, switch: CacheSwitch) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl,
            switch,
        }
    }

    /// Returns the XDG-compliant default cache directory
    ///
    /// Uses `~/.cache/seoscout/` on Linux, or the equivalent on other platforms.
    /// Returns `None` if no home directory can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "seoscout")?;
        Some(project_dirs.cache_dir().join("responses"))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn switch(&self) -> &CacheSwitch {
        &self.switch
    }

    pub fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    /// Returns the path to the file holding `key`
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Looks up the payload stored for `operation` with `params`.
    ///
    /// Returns `None` when caching is disabled, the entry is missing, the
    /// file cannot be read or parsed, or the entry has outlived the TTL (in
    /// which case the file is removed first).
    pub fn get(&self, operation: &str, params: &Value) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }

        let key = CacheKey::derive(operation, params);
        let path = self.entry_path(&key);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(operation, %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(operation, %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry<Value> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(operation, %key, error = %e, "corrupt cache entry, treating as miss");
                return None;
            }
        };

        if self.is_expired(entry.timestamp) {
            debug!(operation, %key, "cache entry expired");
            if let Err(e) = fs::remove_file(&path) {
                debug!(operation, %key, error = %e, "failed to remove expired entry");
            }
            return None;
        }

        debug!(operation, %key, "cache hit");
        Some(entry.data)
    }

    /// Like [`get`](Self::get), deserializing the payload into `T`.
    ///
    /// A payload that does not fit `T` counts as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, operation: &str, params: &Value) -> Option<T> {
        let value = self.get(operation, params)?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(operation, error = %e, "cached payload has unexpected shape");
                None
            }
        }
    }

    /// Stores `payload` for `operation` with `params`, replacing any previous entry.
    ///
    /// Does nothing when caching is disabled. Write failures are logged and dropped.
    pub fn set(&self, operation: &str, params: &Value, payload: &Value) {
        self.set_as(operation, params, payload);
    }

    /// Like [`set`](Self::set) for any serializable payload
    pub fn set_as<T: Serialize + ?Sized>(&self, operation: &str, params: &Value, payload: &T) {
        if !self.is_enabled() {
            return;
        }

        let key = CacheKey::derive(operation, params);
        match self.write_entry(&key, payload) {
            Ok(()) => debug!(operation, %key, "cached response"),
            Err(e) => warn!(operation, %key, error = %e, "cache write failed"),
        }
    }

    /// Writes the entry to a temp file and renames it into place so readers
    /// never see a partially written file.
    fn write_entry<T: Serialize + ?Sized>(&self, key: &CacheKey, data: &T) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let entry = CacheEntry {
            timestamp: Utc::now(),
            data,
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp_path = self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, json)?;

        if let Err(e) = fs::rename(&tmp_path, self.entry_path(key)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }

    /// Returns the cached value for the call, or runs `fetch` and caches its result.
    ///
    /// Errors from `fetch` are returned unchanged and nothing is stored.
    pub async fn fetch_or_insert<T, E, F, Fut>(
        &self,
        operation: &str,
        params: &Value,
        fetch: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(data) = self.get_as::<T>(operation, params) {
            return Ok(Cached {
                data,
                from_cache: true,
            });
        }

        let data = fetch().await?;
        self.set_as(operation, params, &data);
        Ok(Cached {
            data,
            from_cache: false,
        })
    }

    /// An entry is stale once its age exceeds the TTL. A timestamp in the
    /// future (clock moved backwards) counts as age zero.
    fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        let age = Utc::now()
            .signed_duration_since(stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age > self.ttl
    }
}
