use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{ContentFilter, KeywordsRepo, RepoError};
use crate::domain::entities::KeywordRecord;
use crate::domain::types::{ContentStatus, GroupId};

use super::PostgresRepositories;
use super::util::{convert_count, map_sqlx_error, push_content_filter};

#[derive(sqlx::FromRow)]
struct KeywordRow {
    id: i64,
    group_id: i64,
    keyword: String,
    status: i16,
}

impl From<KeywordRow> for KeywordRecord {
    fn from(row: KeywordRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            keyword: row.keyword,
            status: ContentStatus::from_i16(row.status),
        }
    }
}

#[async_trait]
impl KeywordsRepo for PostgresRepositories {
    async fn list(&self, filter: &ContentFilter) -> Result<(Vec<KeywordRecord>, u64), RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, group_id, keyword, status FROM keywords WHERE TRUE",
        );
        push_content_filter(&mut qb, filter);
        qb.push(" ORDER BY id ASC");

        let rows = qb
            .build_query_as::<KeywordRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM keywords WHERE TRUE");
        push_content_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok((
            rows.into_iter().map(KeywordRecord::from).collect(),
            convert_count(total)?,
        ))
    }

    async fn list_group_ids(&self) -> Result<Vec<GroupId>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT DISTINCT group_id FROM keywords WHERE status = ",
        );
        qb.push_bind(ContentStatus::Active.as_i16());
        qb.push(" ORDER BY group_id ASC");

        qb.build_query_scalar()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
