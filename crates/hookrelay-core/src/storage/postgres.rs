//! PostgreSQL-backed store for durable deployments.
//!
//! Every collection lives in one table keyed by
//! `(collection, namespace, key_path)`. Key paths are `TEXT[]` columns, so
//! prefix scans compare an array slice against the requested prefix.

use serde_json::Value;
use sqlx::PgPool;

use super::{Collection, KvStore, StoreFuture};
use crate::error::Result;

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS hookrelay_kv (
        collection TEXT NOT NULL,
        namespace TEXT NOT NULL,
        key_path TEXT[] NOT NULL,
        value JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (collection, namespace, key_path)
    )
";

/// [`KvStore`] over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the backing table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Verifies database connectivity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

impl KvStore for PostgresStore {
    fn get<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let value = sqlx::query_scalar::<_, Value>(
                r"
                SELECT value FROM hookrelay_kv
                WHERE collection = $1 AND namespace = $2 AND key_path = $3
                ",
            )
            .bind(collection.as_str())
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(value)
        })
    }

    fn set<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
        value: Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO hookrelay_kv (collection, namespace, key_path, value)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (collection, namespace, key_path)
                DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                ",
            )
            .bind(collection.as_str())
            .bind(namespace)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                DELETE FROM hookrelay_kv
                WHERE collection = $1 AND namespace = $2 AND key_path = $3
                ",
            )
            .bind(collection.as_str())
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        prefix: &'a [String],
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(async move {
            let values = sqlx::query_scalar::<_, Value>(
                r"
                SELECT value FROM hookrelay_kv
                WHERE collection = $1
                  AND namespace = $2
                  AND key_path[1:cardinality($3::text[])] = $3::text[]
                ORDER BY key_path
                ",
            )
            .bind(collection.as_str())
            .bind(namespace)
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;
            Ok(values)
        })
    }
}
