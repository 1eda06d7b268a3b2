//! Repository traits describing persistence adapters.
//!
//! The pools and caches only ever read through these traits; the single
//! write path is [`StatusStore`], used by the update batcher.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ImageRecord, KeywordRecord, TemplateRecord};
use crate::domain::types::{ContentStatus, GroupId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Filter for keyword and image listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub group_id: Option<GroupId>,
    pub status: Option<ContentStatus>,
}

impl ContentFilter {
    /// Active rows of a single group.
    pub fn active_in(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            status: Some(ContentStatus::Active),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    pub name: Option<String>,
    pub site_group_id: Option<GroupId>,
    pub status: Option<ContentStatus>,
}

impl TemplateFilter {
    pub fn active() -> Self {
        Self {
            status: Some(ContentStatus::Active),
            ..Default::default()
        }
    }

    pub fn exact(name: &str, site_group_id: GroupId) -> Self {
        Self {
            name: Some(name.to_string()),
            site_group_id: Some(site_group_id),
            status: None,
        }
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            site_group_id: None,
            status: Some(ContentStatus::Active),
        }
    }
}

#[async_trait]
pub trait KeywordsRepo: Send + Sync {
    /// Returns the matching rows and the total row count for the filter.
    async fn list(&self, filter: &ContentFilter) -> Result<(Vec<KeywordRecord>, u64), RepoError>;

    /// Distinct group ids that currently own at least one active keyword.
    async fn list_group_ids(&self) -> Result<Vec<GroupId>, RepoError>;
}

#[async_trait]
pub trait ImagesRepo: Send + Sync {
    async fn list(&self, filter: &ContentFilter) -> Result<(Vec<ImageRecord>, u64), RepoError>;

    async fn list_group_ids(&self) -> Result<Vec<GroupId>, RepoError>;
}

#[async_trait]
pub trait TemplatesRepo: Send + Sync {
    async fn list(&self, filter: &TemplateFilter)
    -> Result<(Vec<TemplateRecord>, u64), RepoError>;
}

/// Transactional write handle used to clear pending status flags.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StatusTx>, RepoError>;
}

/// One open transaction against the status store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StatusTx: Send {
    /// Zero the status flag of `ids` in `table`, returning affected rows.
    ///
    /// `table` must already be validated by the caller; implementations
    /// interpolate it into the statement.
    async fn clear_pending(&mut self, table: &str, ids: &[i64]) -> Result<u64, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}
