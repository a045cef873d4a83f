//! PostgreSQL catalog store.
//!
//! Every transaction starts by setting a local `statement_timeout`, so a
//! slow plan or a long wait on a row lock is cancelled by the server.
//!
//! Engagement writes run in one transaction per call:
//! 1. the document must exist as a latest record
//! 2. the aggregate row is created if missing, then locked `FOR UPDATE`
//! 3. the event row is upserted on `(document_id, user_id)`
//! 4. the aggregate is recomputed from the event tables
//!
//! The lock is taken before the event upsert. Concurrent writers for the
//! same document queue on it, and each recompute statement then sees every
//! event committed before it.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::Value;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool, Postgres, Transaction};

use super::CatalogStore;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{EngagementAggregate, NewInstall, NewRating, ServerRow};
use crate::query::BoundQuery;

/// SQLSTATE for a statement cancelled by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

const RECOMPUTE_AGGREGATE: &str = r#"
    UPDATE engagement_aggregate ea SET
        rating = COALESCE(r.avg_rating, 0),
        rating_count = r.rating_count,
        installation_count = i.installation_count,
        updated_at = NOW()
    FROM
        (SELECT AVG(rating)::float8 AS avg_rating, COUNT(*) AS rating_count
         FROM rating_events WHERE document_id = $1) r,
        (SELECT COUNT(DISTINCT user_id) AS installation_count
         FROM install_events WHERE document_id = $1) i
    WHERE ea.document_id = $1
    RETURNING ea.document_id, ea.rating, ea.rating_count, ea.installation_count, ea.updated_at
"#;

/// Catalog store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Begin a transaction with a local statement timeout.
    async fn begin_timed(&self) -> CatalogResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", self.statement_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Ok(tx)
    }

    /// Check existence and lock the aggregate row for this document.
    async fn lock_for_write(tx: &mut Transaction<'static, Postgres>, name: &str) -> CatalogResult<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE name = $1 AND is_latest)",
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)?;

        if !exists {
            return Err(CatalogError::NotFound(name.to_string()));
        }

        sqlx::query(
            "INSERT INTO engagement_aggregate (document_id) VALUES ($1) \
             ON CONFLICT (document_id) DO NOTHING",
        )
        .bind(name)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;

        sqlx::query("SELECT document_id FROM engagement_aggregate WHERE document_id = $1 FOR UPDATE")
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn recompute(
        tx: &mut Transaction<'static, Postgres>,
        name: &str,
    ) -> CatalogResult<EngagementAggregate> {
        sqlx::query_as::<_, EngagementAggregate>(RECOMPUTE_AGGREGATE)
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn fetch_rows(&self, query: &BoundQuery) -> CatalogResult<Vec<ServerRow>> {
        let args = arguments(&query.values)?;
        let mut tx = self.begin_timed().await?;
        let rows = sqlx::query_as_with::<_, ServerRow, _>(&query.sql, args)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(rows)
    }

    async fn fetch_count(&self, query: &BoundQuery) -> CatalogResult<i64> {
        let args = arguments(&query.values)?;
        let mut tx = self.begin_timed().await?;
        let total = sqlx::query_scalar_with::<_, i64, _>(&query.sql, args)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(total)
    }

    async fn engagement(&self, name: &str) -> CatalogResult<EngagementAggregate> {
        let mut tx = self.begin_timed().await?;
        let aggregate = sqlx::query_as::<_, EngagementAggregate>(
            r#"
            SELECT d.name AS document_id,
                   COALESCE(ea.rating, 0)::float8 AS rating,
                   COALESCE(ea.rating_count, 0)::bigint AS rating_count,
                   COALESCE(ea.installation_count, 0)::bigint AS installation_count,
                   ea.updated_at
            FROM documents d
            LEFT JOIN engagement_aggregate ea ON ea.document_id = d.name
            WHERE d.name = $1 AND d.is_latest
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        aggregate.ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    async fn submit_rating(
        &self,
        name: &str,
        user_id: &str,
        rating: &NewRating,
    ) -> CatalogResult<EngagementAggregate> {
        let mut tx = self.begin_timed().await?;
        Self::lock_for_write(&mut tx, name).await?;

        sqlx::query(
            r#"
            INSERT INTO rating_events (document_id, user_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (document_id, user_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                comment = EXCLUDED.comment,
                updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(user_id)
        .bind(rating.rating)
        .bind(rating.comment.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let aggregate = Self::recompute(&mut tx, name).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            document = %name,
            rating = aggregate.rating,
            rating_count = aggregate.rating_count,
            "rating recorded"
        );
        Ok(aggregate)
    }

    async fn record_install(
        &self,
        name: &str,
        user_id: &str,
        install: &NewInstall,
    ) -> CatalogResult<EngagementAggregate> {
        let mut tx = self.begin_timed().await?;
        Self::lock_for_write(&mut tx, name).await?;

        sqlx::query(
            r#"
            INSERT INTO install_events (document_id, user_id, source, version, platform)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (document_id, user_id) DO UPDATE SET
                source = EXCLUDED.source,
                version = EXCLUDED.version,
                platform = EXCLUDED.platform,
                installed_at = NOW()
            "#,
        )
        .bind(name)
        .bind(user_id)
        .bind(install.source.as_deref())
        .bind(install.version.as_deref())
        .bind(install.platform.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let aggregate = Self::recompute(&mut tx, name).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            document = %name,
            installation_count = aggregate.installation_count,
            "install recorded"
        );
        Ok(aggregate)
    }

    async fn ping(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

/// Map a server-side statement cancellation to [`CatalogError::Timeout`].
fn db_error(err: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(ref db) = err
        && db.code().as_deref() == Some(QUERY_CANCELED)
    {
        return CatalogError::Timeout;
    }
    CatalogError::Database(err)
}

/// Bind SeaQuery values in placeholder order.
///
/// Only the value kinds the plan builder emits are accepted.
fn arguments(values: &[Value]) -> CatalogResult<PgArguments> {
    let mut args = PgArguments::default();
    for value in values {
        let added = match value {
            Value::Bool(v) => args.add(*v),
            Value::Int(v) => args.add(*v),
            Value::BigInt(v) => args.add(*v),
            Value::BigUnsigned(v) => {
                let v = v.map(i64::try_from).transpose().map_err(|e| encode_error(e.to_string()))?;
                args.add(v)
            }
            Value::Double(v) => args.add(*v),
            Value::String(v) => args.add(v.as_deref().cloned()),
            Value::Array(_, Some(items)) => args.add(text_items(items)?),
            Value::Array(_, None) => args.add(Option::<Vec<String>>::None),
            other => return Err(encode_error(format!("unsupported parameter {other:?}"))),
        };
        added.map_err(|e| CatalogError::Database(sqlx::Error::Encode(e)))?;
    }
    Ok(args)
}

fn text_items(items: &[Value]) -> CatalogResult<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            Value::String(Some(s)) => Ok(s.as_ref().clone()),
            other => Err(encode_error(format!("unsupported array element {other:?}"))),
        })
        .collect()
}

fn encode_error(message: String) -> CatalogError {
    CatalogError::Database(sqlx::Error::Encode(message.into()))
}
