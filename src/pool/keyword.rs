use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::application::repos::{ContentFilter, KeywordsRepo, RepoError};
use crate::domain::types::GroupId;

use super::encode::encode_entities;
use super::memory::pair_bytes;
use super::reusable::{GroupLoader, GroupedStore, PoolItem, hydrate};
use super::{ContentPool, PoolError, PoolKind, PoolStats, PoolTotals, reload_each};

/// A keyword as stored and in its page-ready encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub raw: String,
    pub encoded: String,
}

impl KeywordEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let encoded = encode_entities(&raw);
        Self { raw, encoded }
    }
}

impl PoolItem for KeywordEntry {
    fn footprint(&self) -> i64 {
        pair_bytes(&self.raw, &self.encoded)
    }
}

/// Grouped keyword pool.
///
/// Raw and encoded forms live in one entry so both views of a group always
/// have the same length.
pub struct KeywordPool {
    repo: Arc<dyn KeywordsRepo>,
    store: GroupedStore<KeywordEntry>,
    cancel: CancellationToken,
}

impl KeywordPool {
    pub fn new(repo: Arc<dyn KeywordsRepo>) -> Self {
        Self {
            repo,
            store: GroupedStore::new(PoolKind::Keywords),
            cancel: CancellationToken::new(),
        }
    }

    /// Full re-fetch of one group, replacing whatever was cached.
    #[instrument(skip(self), fields(pool = "keywords"))]
    pub async fn reload_group(&self, group_id: GroupId) -> Result<usize, PoolError> {
        let (rows, total) = self
            .repo
            .list(&ContentFilter::active_in(group_id))
            .await
            .map_err(|source| PoolError::Load {
                pool: PoolKind::Keywords,
                group_id,
                source,
            })?;

        let entries: Vec<KeywordEntry> = rows
            .into_iter()
            .map(|row| KeywordEntry::new(row.keyword))
            .collect();
        let count = entries.len();
        let delta = self.store.replace_group(group_id, entries);
        debug!(group_id, count, total, memory_delta = delta, "Keywords loaded");
        Ok(count)
    }

    /// Add freshly ingested keywords without re-reading the group.
    ///
    /// Copies the group once per call; pass a whole batch at a time.
    pub fn append_keywords<I, S>(&self, group_id: GroupId, keywords: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<KeywordEntry> = keywords.into_iter().map(KeywordEntry::new).collect();
        if entries.is_empty() {
            return self.store.group_len(group_id);
        }
        self.store.append(group_id, entries)
    }

    /// `count` distinct-position encoded keywords.
    pub fn get_random_keywords(&self, group_id: GroupId, count: usize) -> Vec<String> {
        self.store
            .sample(group_id, count)
            .into_iter()
            .map(|entry| entry.encoded)
            .collect()
    }

    /// `count` distinct-position keywords in their stored form.
    pub fn get_random_raw_keywords(&self, group_id: GroupId, count: usize) -> Vec<String> {
        self.store
            .sample(group_id, count)
            .into_iter()
            .map(|entry| entry.raw)
            .collect()
    }

    /// Random keyword entries carrying both forms.
    pub fn get_random_entries(&self, group_id: GroupId, count: usize) -> Vec<KeywordEntry> {
        self.store.sample(group_id, count)
    }

    pub fn get_keywords(&self, group_id: GroupId) -> Vec<String> {
        self.store
            .all(group_id)
            .into_iter()
            .map(|entry| entry.encoded)
            .collect()
    }

    pub fn get_raw_keywords(&self, group_id: GroupId) -> Vec<String> {
        self.store
            .all(group_id)
            .into_iter()
            .map(|entry| entry.raw)
            .collect()
    }

    /// Drop every cached group.
    pub fn invalidate_all(&self) {
        self.store.clear();
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.store.group_ids()
    }

    pub fn memory_bytes(&self) -> i64 {
        self.store.memory_bytes()
    }
}

#[async_trait]
impl GroupLoader for KeywordPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Keywords
    }

    async fn discover_groups(&self) -> Result<Vec<GroupId>, RepoError> {
        self.repo.list_group_ids().await
    }

    async fn load_group(&self, group_id: GroupId) -> Result<usize, PoolError> {
        self.reload_group(group_id).await
    }
}

#[async_trait]
impl ContentPool for KeywordPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Keywords
    }

    async fn start(&self) -> Result<(), PoolError> {
        hydrate(self, &self.cancel).await
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn pop(&self, group_id: GroupId) -> Result<String, PoolError> {
        self.store.pick(group_id).map(|entry| entry.encoded)
    }

    fn stats(&self, group_id: GroupId) -> PoolStats {
        self.store.stats(group_id)
    }

    fn total_stats(&self) -> PoolTotals {
        self.store.totals()
    }

    async fn reload(&self, group_ids: &[GroupId]) -> Result<(), PoolError> {
        reload_each(group_ids, |group_id| self.reload_group(group_id)).await
    }
}
