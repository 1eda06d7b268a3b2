use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::application::repos::{ContentFilter, ImagesRepo, RepoError};
use crate::domain::types::GroupId;

use super::reusable::{GroupLoader, GroupedStore, hydrate};
use super::{ContentPool, PoolError, PoolKind, PoolStats, PoolTotals, reload_each};

/// Grouped pool of image URLs.
pub struct ImagePool {
    repo: Arc<dyn ImagesRepo>,
    store: GroupedStore<String>,
    cancel: CancellationToken,
}

impl ImagePool {
    pub fn new(repo: Arc<dyn ImagesRepo>) -> Self {
        Self {
            repo,
            store: GroupedStore::new(PoolKind::Images),
            cancel: CancellationToken::new(),
        }
    }

    #[instrument(skip(self), fields(pool = "images"))]
    pub async fn reload_group(&self, group_id: GroupId) -> Result<usize, PoolError> {
        let (rows, total) = self
            .repo
            .list(&ContentFilter::active_in(group_id))
            .await
            .map_err(|source| PoolError::Load {
                pool: PoolKind::Images,
                group_id,
                source,
            })?;

        let urls: Vec<String> = rows.into_iter().map(|row| row.url).collect();
        let count = urls.len();
        let delta = self.store.replace_group(group_id, urls);
        debug!(group_id, count, total, memory_delta = delta, "Images loaded");
        Ok(count)
    }

    /// Add image URLs to a group, creating it when unseen.
    ///
    /// Copies the group once per call; pass a whole batch at a time.
    pub fn append_images<I, S>(&self, group_id: GroupId, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        if urls.is_empty() {
            return self.store.group_len(group_id);
        }
        self.store.append(group_id, urls)
    }

    /// One random image URL, or `None` when neither the group nor the
    /// default group has any.
    pub fn get_random_image(&self, group_id: GroupId) -> Option<String> {
        self.store.pick(group_id).ok()
    }

    pub fn get_random_images(&self, group_id: GroupId, count: usize) -> Vec<String> {
        self.store.sample(group_id, count)
    }

    pub fn get_images(&self, group_id: GroupId) -> Vec<String> {
        self.store.all(group_id)
    }

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
impl GroupLoader for ImagePool {
    fn kind(&self) -> PoolKind {
        PoolKind::Images
    }

    async fn discover_groups(&self) -> Result<Vec<GroupId>, RepoError> {
        self.repo.list_group_ids().await
    }

    async fn load_group(&self, group_id: GroupId) -> Result<usize, PoolError> {
        self.reload_group(group_id).await
    }
}

#[async_trait]
impl ContentPool for ImagePool {
    fn kind(&self) -> PoolKind {
        PoolKind::Images
    }

    async fn start(&self) -> Result<(), PoolError> {
        hydrate(self, &self.cancel).await
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn pop(&self, group_id: GroupId) -> Result<String, PoolError> {
        self.store.pick(group_id)
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
