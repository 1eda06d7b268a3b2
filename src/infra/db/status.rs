use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};

use crate::application::repos::{RepoError, StatusStore, StatusTx};
use crate::domain::types::ContentStatus;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

/// Postgres caps a statement at 65535 bind parameters.
const MAX_IDS_PER_STATEMENT: usize = 10_000;

/// Open transaction used by the update batcher.
pub struct PgStatusTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StatusStore for PostgresRepositories {
    async fn begin(&self) -> Result<Box<dyn StatusTx>, RepoError> {
        let tx = PostgresRepositories::begin(self)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PgStatusTx { tx }))
    }
}

#[async_trait]
impl StatusTx for PgStatusTx {
    async fn clear_pending(&mut self, table: &str, ids: &[i64]) -> Result<u64, RepoError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut affected = 0;
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
            qb.push(table);
            qb.push(" SET status = ");
            qb.push_bind(ContentStatus::Inactive.as_i16());
            qb.push(" WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let result = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
