//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::RwLock;

use memoir_core::{CacheEntry, CacheError, CacheResult};

use crate::CacheBackend;

/// Cache backend holding entries in a process-local map.
///
/// Thread-safe within a process; sharing across processes is out of its
/// reach, use [`crate::FileBackend`] for that. Reads hand back clones, so
/// callers never alias the stored entry.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> CacheResult<usize> {
        Ok(self.entries.read().map_err(|_| CacheError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every stored entry.
    pub fn clear(&self) -> CacheResult<()> {
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

impl CacheBackend for InMemoryBackend {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.contains_key(key))
    }
}
