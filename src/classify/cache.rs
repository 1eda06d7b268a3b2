use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::ClassificationResult;
use crate::util::lock;

const OWNER: &str = "classify::cache";

struct CacheEntry {
    result: ClassificationResult,
    /// `None` when the TTL overflows the clock; such entries never expire.
    expires_at: Option<Instant>,
}

/// Bounded TTL cache of classification results keyed by raw input.
pub(crate) struct ResultCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub(crate) fn new(max_size: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_size)),
            ttl,
        }
    }

    /// Returns a fresh entry. Expired entries are evicted on the way.
    pub(crate) fn get(&self, input: &str) -> Option<ClassificationResult> {
        let mut entries = lock::lock(&self.entries, OWNER, "get");
        let now = Instant::now();
        match entries.get(input) {
            Some(entry) if entry.expires_at.is_none_or(|at| at > now) => {
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.pop(input);
                None
            }
            None => None,
        }
    }

    pub(crate) fn put(&self, input: &str, result: ClassificationResult) {
        let entry = CacheEntry {
            result,
            expires_at: Instant::now().checked_add(self.ttl),
        };
        lock::lock(&self.entries, OWNER, "put").put(input.to_string(), entry);
    }

    pub(crate) fn len(&self) -> usize {
        lock::lock(&self.entries, OWNER, "len").len()
    }
}
