//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::{ContentStatus, GroupId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordRecord {
    pub id: i64,
    pub group_id: GroupId,
    pub keyword: String,
    pub status: ContentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub group_id: GroupId,
    pub url: String,
    pub status: ContentStatus,
}

/// A page skeleton identified by `(name, site_group_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRecord {
    pub id: i64,
    pub name: String,
    pub site_group_id: GroupId,
    pub content: String,
    pub status: ContentStatus,
    pub updated_at: OffsetDateTime,
}

impl TemplateRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
