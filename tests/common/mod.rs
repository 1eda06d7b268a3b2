#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pagepool::application::repos::{
    ContentFilter, ImagesRepo, KeywordsRepo, RepoError, StatusStore, StatusTx, TemplateFilter,
    TemplatesRepo,
};
use pagepool::domain::entities::{ImageRecord, KeywordRecord, TemplateRecord};
use pagepool::domain::types::{ContentStatus, GroupId};
use time::OffsetDateTime;

/// In-memory stand-in for every store the serving path reads from or writes to.
#[derive(Default)]
pub struct MemoryStore {
    pub keywords: Mutex<Vec<KeywordRecord>>,
    pub images: Mutex<Vec<ImageRecord>>,
    pub templates: Mutex<Vec<TemplateRecord>>,
    pub cleared: Arc<Mutex<BTreeMap<String, BTreeSet<i64>>>>,
    pub fail_next_flush: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_keyword(&self, group_id: GroupId, keyword: &str) {
        let mut rows = self.keywords.lock().expect("keywords");
        let id = rows.len() as i64 + 1;
        rows.push(KeywordRecord {
            id,
            group_id,
            keyword: keyword.to_string(),
            status: ContentStatus::Active,
        });
    }

    pub fn add_image(&self, group_id: GroupId, url: &str) {
        let mut rows = self.images.lock().expect("images");
        let id = rows.len() as i64 + 1;
        rows.push(ImageRecord {
            id,
            group_id,
            url: url.to_string(),
            status: ContentStatus::Active,
        });
    }

    pub fn put_template(&self, name: &str, site_group_id: GroupId, content: &str, active: bool) {
        let mut rows = self.templates.lock().expect("templates");
        rows.retain(|row| !(row.name == name && row.site_group_id == site_group_id));
        let id = rows.len() as i64 + 1;
        rows.push(TemplateRecord {
            id,
            name: name.to_string(),
            site_group_id,
            content: content.to_string(),
            status: if active {
                ContentStatus::Active
            } else {
                ContentStatus::Inactive
            },
            updated_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn cleared_ids(&self, table: &str) -> Vec<i64> {
        self.cleared
            .lock()
            .expect("cleared")
            .get(table)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn active_groups(rows: impl Iterator<Item = (GroupId, ContentStatus)>) -> Vec<GroupId> {
    rows.filter(|(_, status)| status.is_active())
        .map(|(group_id, _)| group_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn matches(filter: &ContentFilter, group_id: GroupId, status: ContentStatus) -> bool {
    filter.group_id.is_none_or(|id| id == group_id) && filter.status.is_none_or(|s| s == status)
}

#[async_trait]
impl KeywordsRepo for MemoryStore {
    async fn list(&self, filter: &ContentFilter) -> Result<(Vec<KeywordRecord>, u64), RepoError> {
        let rows: Vec<_> = self
            .keywords
            .lock()
            .expect("keywords")
            .iter()
            .filter(|row| matches(filter, row.group_id, row.status))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((rows, total))
    }

    async fn list_group_ids(&self) -> Result<Vec<GroupId>, RepoError> {
        let rows = self.keywords.lock().expect("keywords");
        Ok(active_groups(rows.iter().map(|row| (row.group_id, row.status))))
    }
}

#[async_trait]
impl ImagesRepo for MemoryStore {
    async fn list(&self, filter: &ContentFilter) -> Result<(Vec<ImageRecord>, u64), RepoError> {
        let rows: Vec<_> = self
            .images
            .lock()
            .expect("images")
            .iter()
            .filter(|row| matches(filter, row.group_id, row.status))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((rows, total))
    }

    async fn list_group_ids(&self) -> Result<Vec<GroupId>, RepoError> {
        let rows = self.images.lock().expect("images");
        Ok(active_groups(rows.iter().map(|row| (row.group_id, row.status))))
    }
}

#[async_trait]
impl TemplatesRepo for MemoryStore {
    async fn list(
        &self,
        filter: &TemplateFilter,
    ) -> Result<(Vec<TemplateRecord>, u64), RepoError> {
        let rows: Vec<_> = self
            .templates
            .lock()
            .expect("templates")
            .iter()
            .filter(|row| filter.name.as_ref().is_none_or(|name| &row.name == name))
            .filter(|row| filter.site_group_id.is_none_or(|id| row.site_group_id == id))
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        Ok((rows, total))
    }
}

pub struct MemoryTx {
    cleared: Arc<Mutex<BTreeMap<String, BTreeSet<i64>>>>,
    fail_next_flush: Arc<Mutex<bool>>,
    writes: Vec<(String, Vec<i64>)>,
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StatusTx>, RepoError> {
        Ok(Box::new(MemoryTx {
            cleared: Arc::clone(&self.cleared),
            fail_next_flush: Arc::clone(&self.fail_next_flush),
            writes: Vec::new(),
        }))
    }
}

#[async_trait]
impl StatusTx for MemoryTx {
    async fn clear_pending(&mut self, table: &str, ids: &[i64]) -> Result<u64, RepoError> {
        let fail = std::mem::take(&mut *self.fail_next_flush.lock().expect("fail flag"));
        if fail {
            return Err(RepoError::Timeout);
        }
        self.writes.push((table.to_string(), ids.to_vec()));
        Ok(ids.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let mut cleared = self.cleared.lock().expect("cleared");
        for (table, ids) in self.writes {
            cleared.entry(table).or_default().extend(ids);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}
