//! Grouped, sampled-with-replacement storage shared by the reusable pools.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::repos::RepoError;
use crate::domain::types::{DEFAULT_GROUP_ID, GroupId, fallback_chain};
use crate::util::lock;

use super::sampling;
use super::{PoolError, PoolKind, PoolStats, PoolTotals};

const METRIC_POOL_HIT: &str = "pagepool_pool_hit_total";
const METRIC_POOL_MISS: &str = "pagepool_pool_miss_total";

/// An element that knows its own approximate footprint.
pub(crate) trait PoolItem: Clone + Send + Sync + 'static {
    fn footprint(&self) -> i64;
}

impl PoolItem for String {
    fn footprint(&self) -> i64 {
        super::memory::string_bytes(self)
    }
}

fn footprint_of<T: PoolItem>(items: &[T]) -> i64 {
    items.iter().map(PoolItem::footprint).sum()
}

/// Per-group slices behind one reader/writer lock.
///
/// Each group is an immutable `Arc<[T]>` swapped wholesale by writers, so a
/// reader either sees the old slice or the new one. `memory_bytes` is
/// adjusted inside the same write critical section as the swap.
pub(crate) struct GroupedStore<T> {
    kind: PoolKind,
    groups: RwLock<HashMap<GroupId, Arc<[T]>>>,
    memory_bytes: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: PoolItem> GroupedStore<T> {
    pub(crate) fn new(kind: PoolKind) -> Self {
        Self {
            kind,
            groups: RwLock::new(HashMap::new()),
            memory_bytes: AtomicI64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Replace a group's slice, returning the memory delta applied.
    pub(crate) fn replace_group(&self, group_id: GroupId, items: Vec<T>) -> i64 {
        let new_size = footprint_of(&items);
        let mut groups = lock::write(&self.groups, self.kind.as_str(), "replace_group");
        let old_size = groups
            .get(&group_id)
            .map(|existing| footprint_of(existing))
            .unwrap_or(0);
        groups.insert(group_id, Arc::from(items));
        let delta = new_size - old_size;
        self.memory_bytes.fetch_add(delta, Ordering::Relaxed);
        delta
    }

    /// Extend a group (creating it when unseen), returning the new length.
    ///
    /// Each call copies the group once, so callers should hand over a whole
    /// batch rather than append item by item. The copy is built outside the
    /// write lock and installed only if no other writer swapped the group in
    /// the meantime; otherwise it is rebuilt against the newer slice.
    pub(crate) fn append(&self, group_id: GroupId, mut items: Vec<T>) -> usize {
        let added = footprint_of(&items);
        loop {
            let base = lock::read(&self.groups, self.kind.as_str(), "append")
                .get(&group_id)
                .cloned();
            let base_len = base.as_ref().map_or(0, |existing| existing.len());

            let mut merged = Vec::with_capacity(base_len + items.len());
            if let Some(existing) = &base {
                merged.extend_from_slice(existing);
            }
            merged.append(&mut items);

            let mut groups = lock::write(&self.groups, self.kind.as_str(), "append");
            let unchanged = match (groups.get(&group_id), &base) {
                (Some(current), Some(base)) => Arc::ptr_eq(current, base),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                let len = merged.len();
                groups.insert(group_id, Arc::from(merged));
                self.memory_bytes.fetch_add(added, Ordering::Relaxed);
                return len;
            }
            drop(groups);
            items = merged.split_off(base_len);
        }
    }

    /// Drop every group and reset the memory estimate.
    pub(crate) fn clear(&self) {
        let mut groups = lock::write(&self.groups, self.kind.as_str(), "clear");
        groups.clear();
        self.memory_bytes.store(0, Ordering::Relaxed);
    }

    /// First non-empty slice along the group's fallback chain.
    pub(crate) fn resolve(&self, group_id: GroupId) -> Option<Arc<[T]>> {
        let groups = lock::read(&self.groups, self.kind.as_str(), "resolve");
        fallback_chain(group_id)
            .filter_map(|candidate| groups.get(&candidate))
            .find(|items| !items.is_empty())
            .cloned()
    }

    /// One random element with hit/miss accounting.
    pub(crate) fn pick(&self, group_id: GroupId) -> Result<T, PoolError> {
        let picked = self
            .resolve(group_id)
            .and_then(|items| sampling::choose(&items));
        match picked {
            Some(item) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_POOL_HIT, "pool" => self.kind.as_str()).increment(1);
                Ok(item)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_POOL_MISS, "pool" => self.kind.as_str()).increment(1);
                Err(PoolError::EmptyPool {
                    pool: self.kind,
                    group_id,
                })
            }
        }
    }

    pub(crate) fn sample(&self, group_id: GroupId, count: usize) -> Vec<T> {
        match self.resolve(group_id) {
            Some(items) => sampling::sample(&items, count),
            None => Vec::new(),
        }
    }

    pub(crate) fn all(&self, group_id: GroupId) -> Vec<T> {
        self.resolve(group_id)
            .map(|items| items.to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn group_len(&self, group_id: GroupId) -> usize {
        lock::read(&self.groups, self.kind.as_str(), "group_len")
            .get(&group_id)
            .map_or(0, |items| items.len())
    }

    pub(crate) fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = lock::read(&self.groups, self.kind.as_str(), "group_ids")
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn memory_bytes(&self) -> i64 {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn stats(&self, group_id: GroupId) -> PoolStats {
        let current = self.group_len(group_id);
        PoolStats {
            pool: self.kind,
            group_id,
            current,
            capacity: current,
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes(),
        }
    }

    pub(crate) fn totals(&self) -> PoolTotals {
        let (groups, items) = {
            let groups = lock::read(&self.groups, self.kind.as_str(), "totals");
            (groups.len(), groups.values().map(|items| items.len()).sum())
        };
        PoolTotals {
            pool: self.kind,
            groups,
            items,
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes(),
        }
    }
}

/// Source of groups for start-up hydration.
#[async_trait]
pub(crate) trait GroupLoader: Send + Sync {
    fn kind(&self) -> PoolKind;

    async fn discover_groups(&self) -> Result<Vec<GroupId>, RepoError>;

    /// Fetch and install one group, returning its item count.
    async fn load_group(&self, group_id: GroupId) -> Result<usize, PoolError>;
}

/// Discover groups and load them one by one, best effort.
///
/// Discovery failure or an empty result degrades to the default group; a
/// failing group is logged and skipped. Returns `Stopped` if `cancel` fires
/// before loading finishes.
pub(crate) async fn hydrate<L>(loader: &L, cancel: &CancellationToken) -> Result<(), PoolError>
where
    L: GroupLoader + ?Sized,
{
    let pool = loader.kind();
    let discovered = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PoolError::Stopped { pool }),
        result = loader.discover_groups() => result,
    };

    let group_ids = match discovered {
        Ok(ids) if !ids.is_empty() => ids,
        Ok(_) => {
            warn!(pool = pool.as_str(), "No groups discovered; using default group");
            vec![DEFAULT_GROUP_ID]
        }
        Err(error) => {
            warn!(
                pool = pool.as_str(),
                error = %error,
                "Group discovery failed; using default group"
            );
            vec![DEFAULT_GROUP_ID]
        }
    };

    let mut loaded = 0usize;
    for group_id in &group_ids {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(pool = pool.as_str(), loaded, "Pool start-up cancelled");
                return Err(PoolError::Stopped { pool });
            }
            result = loader.load_group(*group_id) => result,
        };
        match outcome {
            Ok(count) => {
                loaded += 1;
                debug!(pool = pool.as_str(), group_id, count, "Group loaded");
            }
            Err(error) => {
                warn!(pool = pool.as_str(), group_id, error = %error, "Group load failed");
            }
        }
    }

    info!(
        pool = pool.as_str(),
        groups = group_ids.len(),
        loaded,
        "Pool started"
    );
    Ok(())
}
