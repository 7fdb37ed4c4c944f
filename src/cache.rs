use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A cached value and the moment it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub value: Value,
}

/// Key/value store for fetched data. Entries are never invalidated explicitly;
/// staleness is decided by [`Freshness`].
pub trait Cache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn put(&mut self, key: &str, value: Value, stored_at: DateTime<Utc>) -> Result<()>;
}

/// Maximum age before a cache entry is refetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    max_age: Duration,
}

impl Freshness {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) < self.max_age
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::hours(24)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value, stored_at: DateTime<Utc>) -> Result<()> {
        self.entries
            .insert(key.to_string(), CacheEntry { stored_at, value });
        Ok(())
    }
}

/// One JSON file per key under a directory.
///
/// Unreadable or corrupt files count as a miss so the data is refetched.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One file per key. Bytes outside `[A-Za-z0-9-]` are written as `_xx`
    /// hex escapes, so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{:02x}", byte));
            }
        }
        self.dir.join(format!("{}.json", name))
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {:?}", path))?;
        match serde_json::from_str(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("Ignoring corrupt cache file {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    fn put(&mut self, key: &str, value: Value, stored_at: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", self.dir))?;
        let path = self.path_for(key);
        let content = serde_json::to_string(&CacheEntry { stored_at, value })?;
        fs::write(&path, content).with_context(|| format!("Failed to write cache file: {:?}", path))?;
        Ok(())
    }
}
