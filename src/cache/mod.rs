//! Verdict cache.
//!
//! Oracle verdicts are content-addressed by the query text and the sorted set of
//! candidate pattern sources, so identical lookups against an identical catalog
//! always hit regardless of registration order.
//!
//! The cache is a pure optimization. Backend failures and corrupt entries are
//! logged and treated as misses; nothing here ever fails a lookup.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ResultCache                   │
//! │   per-key locks: read-then-write is atomic    │
//! ├──────────────────────────────────────────────┤
//! │        dyn VerdictStore (append-only)         │
//! │  ┌────────────────────┐ ┌──────────────────┐  │
//! │  │ InMemoryVerdictStore│ │ FileVerdictStore │  │
//! │  └────────────────────┘ └──────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

mod codec;
mod file;
mod memory;

pub use file::FileVerdictStore;
pub use memory::InMemoryVerdictStore;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::verdict::OracleVerdict;

/// Domain separator mixed into every key hash.
const KEY_DOMAIN: &[u8] = b"semstep.cache.v1";

/// Hex-encoded BLAKE3 digest identifying a cached verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for a query against a set of pattern sources.
    ///
    /// Pattern order does not matter. Every component is length-prefixed so
    /// distinct inputs cannot collide by concatenation.
    #[must_use]
    pub fn compute<S: AsRef<str>>(text: &str, pattern_texts: &[S]) -> Self {
        let mut sorted: Vec<&str> = pattern_texts.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(KEY_DOMAIN);
        update_framed(&mut hasher, text);
        hasher.update(&(sorted.len() as u64).to_le_bytes());
        for pattern in sorted {
            update_framed(&mut hasher, pattern);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `name` has the shape of a key (64 lowercase hex digits).
    #[must_use]
    pub fn is_key_like(name: &str) -> bool {
        name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_framed(hasher: &mut blake3::Hasher, part: &str) {
    hasher.update(&(part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

/// A stored verdict. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry was written under.
    pub key: CacheKey,
    /// The cached oracle verdict.
    pub verdict: OracleVerdict,
    /// When the entry was written.
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(key: CacheKey, verdict: OracleVerdict) -> Self {
        Self {
            key,
            verdict,
            written_at: Utc::now(),
        }
    }
}

/// Storage backend for cache entries.
///
/// Implementations should handle concurrent access safely. Unreadable entries
/// should be reported as errors, not silently dropped; the cache decides how to
/// degrade.
pub trait VerdictStore: Send + Sync {
    /// Loads the entry for `key`, `Ok(None)` if absent.
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores an entry, replacing whatever is under its key.
    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize, CacheError>;

    /// Returns true if nothing is stored.
    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Outcome of [`ResultCache::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// The cached or freshly fetched verdict.
    pub verdict: OracleVerdict,
    /// Whether the verdict came from the cache.
    pub hit: bool,
}

/// Content-addressed verdict cache over a pluggable store.
pub struct ResultCache {
    store: Arc<dyn VerdictStore>,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn VerdictStore>) -> Self {
        Self {
            store,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache held entirely in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryVerdictStore::new()))
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VerdictStore> {
        &self.store
    }

    /// Number of stored verdicts.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if it cannot be enumerated.
    pub fn len(&self) -> Result<usize, CacheError> {
        self.store.len()
    }

    /// Returns true if nothing is cached.
    ///
    /// # Errors
    ///
    /// Same as [`ResultCache::len`].
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        self.store.is_empty()
    }

    /// Drops every stored verdict.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if an entry cannot be removed.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.store.clear()
    }

    /// Returns the cached verdict for this query, if any.
    ///
    /// Unreadable entries and entries recorded under a different key are misses.
    #[must_use]
    pub fn get<S: AsRef<str>>(&self, text: &str, pattern_texts: &[S]) -> Option<OracleVerdict> {
        self.load_valid(&CacheKey::compute(text, pattern_texts))
    }

    /// Records a verdict for this query.
    ///
    /// An existing readable entry is left in place; a missing or corrupt one is
    /// (re)written.
    pub fn put<S: AsRef<str>>(&self, text: &str, pattern_texts: &[S], verdict: &OracleVerdict) {
        let key = CacheKey::compute(text, pattern_texts);
        let lock = self.key_lock(&key);
        {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if self.load_valid(&key).is_none() {
                self.write(key.clone(), verdict.clone());
            }
        }
        self.release_key_lock(&key, lock);
    }

    /// Returns the cached verdict or runs `fetch` and caches its result.
    ///
    /// Whatever `fetch` returns is stored, the no-match verdict included.
    /// Concurrent calls for the same key are serialized, so `fetch` runs at
    /// most once per key while an entry can be stored.
    pub fn get_or_fetch<S, F>(&self, text: &str, pattern_texts: &[S], fetch: F) -> CacheLookup
    where
        S: AsRef<str>,
        F: FnOnce() -> OracleVerdict,
    {
        let key = CacheKey::compute(text, pattern_texts);
        let lock = self.key_lock(&key);
        let lookup = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(verdict) = self.load_valid(&key) {
                tracing::debug!(key = %key, "verdict cache hit");
                CacheLookup { verdict, hit: true }
            } else {
                tracing::debug!(key = %key, "verdict cache miss");
                let verdict = fetch();
                self.write(key.clone(), verdict.clone());
                CacheLookup {
                    verdict,
                    hit: false,
                }
            }
        };
        self.release_key_lock(&key, lock);
        lookup
    }

    fn load_valid(&self, key: &CacheKey) -> Option<OracleVerdict> {
        match self.store.load(key) {
            Ok(Some(entry)) if entry.key == *key => Some(entry.verdict),
            Ok(Some(entry)) => {
                tracing::warn!(key = %key, stored_key = %entry.key, "cache entry key mismatch, ignoring");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "unreadable cache entry, treating as miss");
                None
            }
        }
    }

    fn write(&self, key: CacheKey, verdict: OracleVerdict) {
        let entry = CacheEntry::new(key, verdict);
        if let Err(e) = self.store.store(&entry) {
            tracing::warn!(key = %entry.key, error = %e, "failed to write cache entry");
        }
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn release_key_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        // Only the map's handle left: nobody else is waiting on this key.
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}
