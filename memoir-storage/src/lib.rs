//! MEMOIR Storage - cache backends and the memoization call wrapper.
//!
//! Defines the storage abstraction the memoizer persists entries through,
//! with an in-memory implementation and a file-backed implementation that
//! is safe across threads and processes. Document-store backends are
//! external collaborators: anything satisfying [`CacheBackend`] drops in.

pub mod file;
pub mod lock;
pub mod memory;
pub mod wrapper;

pub use file::FileBackend;
pub use lock::FileLock;
pub use memory::InMemoryBackend;
pub use wrapper::{wrap, CallArgs, CallError, Memoized, Memoizer, Outcome};

use memoir_core::{CacheEntry, CacheResult};

/// Storage backend for serialized cache entries.
///
/// Implementations are polymorphic over the storage medium (in-memory,
/// file-backed, document store). All operations are synchronous and
/// blocking; the cache introduces no concurrency of its own beyond what a
/// backend needs for mutual exclusion.
///
/// Every `get` returns a freshly reconstructed entry: callers never share
/// mutable state with what the backend holds.
pub trait CacheBackend: Send + Sync {
    /// Retrieve the entry stored under `key`, if any.
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Persist an entry under `key`, replacing any previous entry
    /// (last writer wins).
    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()>;

    /// Whether an entry is stored under `key`.
    fn exists(&self, key: &str) -> CacheResult<bool>;
}
