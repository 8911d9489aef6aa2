//! In-memory verdict store.
//!
//! Lives for the process only. Used when caching is wanted within a single run,
//! and in tests.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::CacheError;

use super::{CacheEntry, CacheKey, VerdictStore};

fn lock_err(context: &'static str) -> CacheError {
    CacheError::Backend {
        message: format!("poisoned lock: {context}"),
    }
}

/// Thread-safe in-memory [`VerdictStore`].
#[derive(Debug, Default)]
pub struct InMemoryVerdictStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryVerdictStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: CacheKey, entry: CacheEntry) {
        self.entries
            .write()
            .expect("entries lock")
            .insert(key, entry);
    }
}

impl VerdictStore for InMemoryVerdictStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| lock_err("memory.load"))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("memory.store"))?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.read().map_err(|_| lock_err("memory.len"))?.len())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| lock_err("memory.clear"))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::OracleVerdict;

    #[test]
    fn test_store_load_clear() {
        let store = InMemoryVerdictStore::new();
        let key = CacheKey::compute("q", &["/^a$/"]);
        assert!(store.load(&key).unwrap().is_none());
        assert!(store.is_empty().unwrap());

        store
            .store(&CacheEntry::new(key.clone(), OracleVerdict::no_match()))
            .unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.load(&key).unwrap().unwrap().verdict.is_no_match());

        store.clear().unwrap();
        assert!(store.load(&key).unwrap().is_none());
    }
}
