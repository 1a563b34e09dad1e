//! Bounded cache of unpacked archives, keyed by source identity.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use crate::handle::ArchiveHandle;

/// Storage the loader consults before unpacking an archive.
///
/// Implementations must be safe to share between concurrent loads.
pub trait CacheProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<ArchiveHandle>>;

    /// Insert or replace the entry for `key`.
    fn put(&self, key: &str, handle: Arc<ArchiveHandle>);

    /// Drop every entry. Extracted files stay on disk.
    fn clear(&self);
}

/// Least-recently-used cache of archive handles.
///
/// Eviction only forgets the handle; the extracted working directory is
/// left for [`Loader::purge`](crate::Loader::purge) to remove.
pub struct ArchiveCache {
    entries: Mutex<LruCache<String, Arc<ArchiveHandle>>>,
}

impl ArchiveCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(clamp(capacity))),
        }
    }

    /// Process-wide instance used by [`LoaderConfig::default`](crate::LoaderConfig).
    pub fn shared() -> Arc<ArchiveCache> {
        static SHARED: OnceLock<Arc<ArchiveCache>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(ArchiveCache::default()))
            .clone()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Shrinking evicts least-recently-used entries down to the new limit.
    pub fn set_capacity(&self, capacity: usize) {
        self.entries.lock().resize(clamp(capacity));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Presence check that does not count as a use.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }
}

impl Default for ArchiveCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl CacheProvider for ArchiveCache {
    fn get(&self, key: &str) -> Option<Arc<ArchiveHandle>> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: &str, handle: Arc<ArchiveHandle>) {
        self.entries.lock().put(key.to_owned(), handle);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn clamp(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
