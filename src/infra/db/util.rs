use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{ContentFilter, RepoError};

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::Database(db)
            if db.message().contains("invalid input syntax")
                || db.message().contains("violates") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        other => RepoError::from_persistence(other),
    }
}

/// Appends ` AND ...` clauses for a content filter. Expects a preceding `WHERE TRUE`.
pub(super) fn push_content_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ContentFilter) {
    if let Some(group_id) = filter.group_id {
        qb.push(" AND group_id = ");
        qb.push_bind(group_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_i16());
    }
}

pub(super) fn convert_count(value: i64) -> Result<u64, RepoError> {
    u64::try_from(value).map_err(|err| RepoError::InvalidInput {
        message: err.to_string(),
    })
}
