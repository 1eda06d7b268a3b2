//! Reusable content pools.
//!
//! Pools hold per-group content loaded once from the relational store and
//! served from memory on every request:
//!
//! - [`KeywordPool`]: keywords kept raw and entity-encoded, side by side
//! - [`ImagePool`]: image URLs
//!
//! Both sample with replacement. A lookup against a missing or empty group
//! falls back to [`DEFAULT_GROUP_ID`](crate::domain::types::DEFAULT_GROUP_ID).

pub mod encode;
mod image;
mod keyword;
pub mod memory;
mod reusable;
pub mod sampling;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::types::GroupId;

pub use image::ImagePool;
pub use keyword::{KeywordEntry, KeywordPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Keywords,
    Images,
}

impl PoolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolKind::Keywords => "keywords",
            PoolKind::Images => "images",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard snapshot of one pool group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool: PoolKind,
    pub group_id: GroupId,
    pub current: usize,
    pub capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub memory_bytes: i64,
}

/// Whole-pool view summed over every cached group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolTotals {
    pub pool: PoolKind,
    pub groups: usize,
    pub items: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub memory_bytes: i64,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("{pool} pool has no content for group {group_id} or the default group")]
    EmptyPool { pool: PoolKind, group_id: GroupId },
    #[error("failed to load group {group_id} of the {pool} pool: {source}")]
    Load {
        pool: PoolKind,
        group_id: GroupId,
        #[source]
        source: RepoError,
    },
    #[error("{pool} pool was stopped")]
    Stopped { pool: PoolKind },
}

/// Common contract for content pools used by the page generator.
#[async_trait]
pub trait ContentPool: Send + Sync {
    fn kind(&self) -> PoolKind;

    /// Discover groups in the store and load each one, best effort.
    async fn start(&self) -> Result<(), PoolError>;

    /// Cancel any in-flight start-up load. Idempotent.
    fn stop(&self);

    /// One item of `group_id`, falling back to the default group.
    fn pop(&self, group_id: GroupId) -> Result<String, PoolError>;

    fn stats(&self, group_id: GroupId) -> PoolStats;

    fn total_stats(&self) -> PoolTotals;

    /// Re-fetch the given groups. Every group is attempted; the first error
    /// is returned.
    async fn reload(&self, group_ids: &[GroupId]) -> Result<(), PoolError>;

    /// Reusable pools are never drained, so there is nothing to refill.
    async fn refill_if_needed(&self, _group_id: GroupId) -> Result<(), PoolError> {
        Ok(())
    }
}

/// Reload each group through `reload_one`, keeping the first failure.
pub(crate) async fn reload_each<F, Fut>(group_ids: &[GroupId], reload_one: F) -> Result<(), PoolError>
where
    F: Fn(GroupId) -> Fut,
    Fut: Future<Output = Result<usize, PoolError>>,
{
    let mut first_error = None;
    for group_id in group_ids {
        if let Err(error) = reload_one(*group_id).await {
            tracing::warn!(group_id, error = %error, "Group reload failed");
            first_error.get_or_insert(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}
