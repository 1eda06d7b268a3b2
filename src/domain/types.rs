//! Shared domain scalars aligned with persisted columns.

use serde::{Deserialize, Serialize};

/// Partition key for pooled content and templates.
pub type GroupId = i64;

/// The reserved group every lookup falls back to.
pub const DEFAULT_GROUP_ID: GroupId = 1;

/// Row status flag shared by content and template tables.
///
/// Stored as a small integer: `1` marks a row as active (or, for consumable
/// content, pending), `0` marks it inactive or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Inactive,
    Active,
}

impl ContentStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            ContentStatus::Inactive => 0,
            ContentStatus::Active => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            ContentStatus::Active
        } else {
            ContentStatus::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ContentStatus::Active)
    }
}

/// Returns the groups to probe for `group_id`, most specific first.
pub fn fallback_chain(group_id: GroupId) -> impl Iterator<Item = GroupId> {
    let fallback = (group_id != DEFAULT_GROUP_ID).then_some(DEFAULT_GROUP_ID);
    std::iter::once(group_id).chain(fallback)
}
