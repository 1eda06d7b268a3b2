use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{RepoError, TemplateFilter, TemplatesRepo};
use crate::domain::entities::TemplateRecord;
use crate::domain::types::ContentStatus;

use super::PostgresRepositories;
use super::util::{convert_count, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    name: String,
    site_group_id: i64,
    content: String,
    status: i16,
    updated_at: OffsetDateTime,
}

impl From<TemplateRow> for TemplateRecord {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            site_group_id: row.site_group_id,
            content: row.content,
            status: ContentStatus::from_i16(row.status),
            updated_at: row.updated_at,
        }
    }
}

fn push_template_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q TemplateFilter) {
    if let Some(name) = filter.name.as_ref() {
        qb.push(" AND name = ");
        qb.push_bind(name);
    }
    if let Some(site_group_id) = filter.site_group_id {
        qb.push(" AND site_group_id = ");
        qb.push_bind(site_group_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_i16());
    }
}

#[async_trait]
impl TemplatesRepo for PostgresRepositories {
    async fn list(
        &self,
        filter: &TemplateFilter,
    ) -> Result<(Vec<TemplateRecord>, u64), RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, name, site_group_id, content, status, updated_at FROM templates WHERE TRUE",
        );
        push_template_filter(&mut qb, filter);
        qb.push(" ORDER BY site_group_id ASC, name ASC, id ASC");

        let rows = qb
            .build_query_as::<TemplateRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM templates WHERE TRUE");
        push_template_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok((
            rows.into_iter().map(TemplateRecord::from).collect(),
            convert_count(total)?,
        ))
    }
}
