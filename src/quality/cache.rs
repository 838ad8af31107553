//! Evaluation cache
//!
//! Evaluations are expensive (one or two model calls each), so every decision
//! is cached under the source's canonical URL with an expiry. The same URL
//! showing up in a later step, a later topic or a later run reuses the
//! stored verdict until it expires.
//!
//! # Cache Key Strategy
//!
//! Keys are SHA-256 hashes of the canonical URL, so they are fixed-length,
//! safe to use as JSON object keys, and stable across restarts.
//!
//! # Corruption
//!
//! [`FileEvaluationCache`] treats an unreadable file, or any entry that does
//! not deserialize or carries out-of-range scores, as a miss. The source is
//! simply evaluated again; the cache never surfaces an error to the caller
//! on read.
//!
//! # Example
//!
//! ```ignore
//! use veritas::quality::cache::{EvaluationCache, InMemoryEvaluationCache};
//! use veritas::utils::clock::SystemClock;
//! use std::sync::Arc;
//!
//! let cache = InMemoryEvaluationCache::new(Arc::new(SystemClock));
//! if let Some(entry) = cache.get("https://oecd.org/report") {
//!     // reuse entry.scores / entry.keep
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::types::{AppError, Result, SourceCategory, SourceScores};
use crate::utils::clock::Clock;

// ============================================================================
// Cache Types
// ============================================================================

/// A stored evaluation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCacheEntry {
    pub canonical_url: String,
    pub scores: SourceScores,
    pub keep: bool,
    #[serde(default)]
    pub category: SourceCategory,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub fast_track: Option<u8>,
    pub evaluated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EvaluationCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Structural sanity check applied to entries read from storage.
    pub fn is_valid(&self) -> bool {
        !self.canonical_url.is_empty()
            && self.scores.is_valid()
            && self.expires_at >= self.evaluated_at
    }
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses (absent or expired)
    pub misses: u64,
    /// Number of entries currently stored
    pub entry_count: usize,
    /// Stored entries already past their expiry
    pub expired_count: usize,
    /// Entries discarded while loading because they were invalid
    pub discarded: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Configuration for the evaluation cache (`[cache]` in `veritas.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Whether the cache is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Days an evaluation stays valid
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    /// JSON file backing the cache. In-memory only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_days() -> i64 {
    7
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_days: default_ttl_days(),
            path: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days.max(0))
    }
}

// ============================================================================
// Cache Trait
// ============================================================================

/// Storage for evaluation decisions keyed by canonical URL.
///
/// Upserts are idempotent by key, so concurrent writers for the same URL are
/// harmless: the last write wins and both carry equivalent decisions.
pub trait EvaluationCache: Send + Sync {
    /// Fetch a non-expired entry
    fn get(&self, canonical_url: &str) -> Option<EvaluationCacheEntry>;

    /// Insert or replace the entry for `entry.canonical_url`
    fn upsert(&self, entry: EvaluationCacheEntry) -> Result<()>;

    /// Remove an entry from the cache
    fn invalidate(&self, canonical_url: &str) -> Result<()>;

    /// Clear all entries from the cache
    fn clear(&self) -> Result<()>;

    /// Drop expired entries, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;

    /// Get cache statistics
    fn stats(&self) -> CacheStats;

    /// Check if the cache is enabled
    fn is_enabled(&self) -> bool;

    /// Compute the storage key for a canonical URL
    fn compute_key(&self, canonical_url: &str) -> String {
        cache_key(canonical_url)
    }
}

pub fn cache_key(canonical_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// In-Memory Cache
// ============================================================================

/// Thread-safe in-memory cache. Expired entries are dropped lazily on read.
pub struct InMemoryEvaluationCache {
    entries: RwLock<HashMap<String, EvaluationCacheEntry>>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    discarded: AtomicU64,
}

impl InMemoryEvaluationCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_entries(clock, HashMap::new(), true)
    }

    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self::with_entries(clock, HashMap::new(), false)
    }

    fn with_entries(
        clock: Arc<dyn Clock>,
        entries: HashMap<String, EvaluationCacheEntry>,
        enabled: bool,
    ) -> Self {
        Self {
            entries: RwLock::new(entries),
            clock,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> HashMap<String, EvaluationCacheEntry> {
        self.entries.read().clone()
    }
}

impl EvaluationCache for InMemoryEvaluationCache {
    fn get(&self, canonical_url: &str) -> Option<EvaluationCacheEntry> {
        if !self.enabled {
            return None;
        }

        let key = self.compute_key(canonical_url);
        let now = self.clock.now();

        // First try with a read lock
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: remove with a write lock
        let mut entries = self.entries.write();
        if entries.get(&key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(&key);
            debug!("Evaluation cache entry expired for {}", canonical_url);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn upsert(&self, entry: EvaluationCacheEntry) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if !entry.is_valid() {
            return Err(AppError::Cache(format!(
                "refusing to store invalid entry for '{}'",
                entry.canonical_url
            )));
        }

        let key = self.compute_key(&entry.canonical_url);
        self.entries.write().insert(key, entry);
        Ok(())
    }

    fn invalidate(&self, canonical_url: &str) -> Result<()> {
        let key = self.compute_key(canonical_url);
        self.entries.write().remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len(),
            expired_count: entries.values().filter(|e| e.is_expired(now)).count(),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============================================================================
// JSON File Cache
// ============================================================================

/// Cache persisted to a single JSON object (`key -> entry`) on every write.
pub struct FileEvaluationCache {
    memory: InMemoryEvaluationCache,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEvaluationCache {
    /// Open (or create on first write) the cache file at `path`.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        let path = path.as_ref().to_path_buf();
        let (entries, discarded) = load_entries(&path);
        let memory = InMemoryEvaluationCache::with_entries(clock, entries, true);
        memory.discarded.store(discarded, Ordering::Relaxed);

        Self {
            memory,
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let snapshot = self.memory.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Read entries from disk, discarding anything that does not validate.
fn load_entries(path: &Path) -> (HashMap<String, EvaluationCacheEntry>, u64) {
    let mut entries = HashMap::new();
    if !path.exists() {
        return (entries, 0);
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Evaluation cache at {:?} unreadable ({}); starting empty", path, e);
            return (entries, 0);
        }
    };

    let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(map) => map,
        Err(e) => {
            warn!("Evaluation cache at {:?} is corrupt ({}); starting empty", path, e);
            return (entries, 0);
        }
    };

    let mut discarded = 0;
    for (key, value) in map {
        match serde_json::from_value::<EvaluationCacheEntry>(value) {
            Ok(entry) if entry.is_valid() && cache_key(&entry.canonical_url) == key => {
                entries.insert(key, entry);
            }
            Ok(_) | Err(_) => {
                discarded += 1;
            }
        }
    }

    if discarded > 0 {
        warn!(
            "Discarded {} invalid evaluation cache entries from {:?}",
            discarded, path
        );
    }
    (entries, discarded)
}

impl EvaluationCache for FileEvaluationCache {
    fn get(&self, canonical_url: &str) -> Option<EvaluationCacheEntry> {
        self.memory.get(canonical_url)
    }

    fn upsert(&self, entry: EvaluationCacheEntry) -> Result<()> {
        self.memory.upsert(entry)?;
        self.persist()
    }

    fn invalidate(&self, canonical_url: &str) -> Result<()> {
        self.memory.invalidate(canonical_url)?;
        self.persist()
    }

    fn clear(&self) -> Result<()> {
        self.memory.clear()?;
        self.persist()
    }

    fn purge_expired(&self) -> Result<usize> {
        let removed = self.memory.purge_expired()?;
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        self.memory.stats()
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

// ============================================================================
// No-Op Cache
// ============================================================================

/// A no-op cache that doesn't store anything
///
/// Useful for disabling caching without changing the code structure.
#[derive(Debug, Default)]
pub struct NoOpEvaluationCache;

impl NoOpEvaluationCache {
    pub fn new() -> Self {
        Self
    }
}

impl EvaluationCache for NoOpEvaluationCache {
    fn get(&self, _canonical_url: &str) -> Option<EvaluationCacheEntry> {
        None
    }

    fn upsert(&self, _entry: EvaluationCacheEntry) -> Result<()> {
        Ok(())
    }

    fn invalidate(&self, _canonical_url: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the cache described by `config`.
pub fn build_cache(config: &CacheConfig, clock: Arc<dyn Clock>) -> Arc<dyn EvaluationCache> {
    match (&config.enabled, &config.path) {
        (false, _) => Arc::new(NoOpEvaluationCache::new()),
        (true, Some(path)) => Arc::new(FileEvaluationCache::open(path, clock)),
        (true, None) => Arc::new(InMemoryEvaluationCache::new(clock)),
    }
}

// ============================================================================
// Tests
// ============================================================================
