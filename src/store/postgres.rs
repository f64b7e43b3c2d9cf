//! PostgreSQL document backend.
//!
//! Every collection shares one JSONB table keyed by `(collection, partition_key, id)`;
//! `etag` and `updated_at` play the role of the store-managed `_etag` and `_ts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Postgres, QueryBuilder, Row,
};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::{document::id_of, Document, DocumentStore, Filter, Query, SortOrder, StoreError};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `dsn`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`StoreError`] if the pool cannot be established.
    pub async fn connect(dsn: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(acquire_timeout)
            .connect(dsn)
            .await
            .map_err(classify)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `documents` table and its indexes when missing.
    ///
    /// # Errors
    ///
    /// Returns a classified [`StoreError`] if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE",
            db.statement = "schema.sql"
        );
        sqlx::Executor::execute(&self.pool, SCHEMA_SQL)
            .instrument(span)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn write(
        &self,
        statement: &'static str,
        operation: &'static str,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Option<PgRow>, StoreError> {
        let id = id_of(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("document is missing 'id'".into()))?
            .to_string();
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = statement
        );
        sqlx::query(statement)
            .bind(collection)
            .bind(partition)
            .bind(id)
            .bind(Json(Value::Object(doc)))
            .bind(Uuid::new_v4())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(classify)
    }
}

const READ_SQL: &str = r"
    SELECT body, etag, updated_at
    FROM documents
    WHERE collection = $1 AND partition_key = $2 AND id = $3
";

const UPSERT_SQL: &str = r"
    INSERT INTO documents (collection, partition_key, id, body, etag, updated_at)
    VALUES ($1, $2, $3, $4, $5, NOW())
    ON CONFLICT (collection, partition_key, id)
    DO UPDATE SET body = EXCLUDED.body, etag = EXCLUDED.etag, updated_at = EXCLUDED.updated_at
    RETURNING body, etag, updated_at
";

const CREATE_SQL: &str = r"
    INSERT INTO documents (collection, partition_key, id, body, etag, updated_at)
    VALUES ($1, $2, $3, $4, $5, NOW())
    RETURNING body, etag, updated_at
";

const REPLACE_SQL: &str = r"
    UPDATE documents
    SET body = $4, etag = $5, updated_at = NOW()
    WHERE collection = $1 AND partition_key = $2 AND id = $3
    RETURNING body, etag, updated_at
";

#[async_trait]
impl DocumentStore for PgStore {
    async fn read(
        &self,
        collection: &str,
        id: &str,
        partition: &str,
    ) -> Result<Document, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = READ_SQL
        );
        let row = sqlx::query(READ_SQL)
            .bind(collection)
            .bind(partition)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)?;
        row_to_document(&row)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut builder = select_builder(collection, query);
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = builder.sql()
        );
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(classify)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn upsert(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        let row = self
            .write(UPSERT_SQL, "UPSERT", collection, partition, doc)
            .await?
            .ok_or_else(|| StoreError::backend(500, "upsert returned no row"))?;
        row_to_document(&row)
    }

    async fn create(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        let row = self
            .write(CREATE_SQL, "INSERT", collection, partition, doc)
            .await?
            .ok_or_else(|| StoreError::backend(500, "insert returned no row"))?;
        row_to_document(&row)
    }

    async fn replace(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        let row = self
            .write(REPLACE_SQL, "UPDATE", collection, partition, doc)
            .await?
            .ok_or(StoreError::NotFound)?;
        row_to_document(&row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

// Field names and values are always bound, never spliced into the SQL text.
fn select_builder<'q>(collection: &str, query: &Query) -> QueryBuilder<'q, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT body, etag, updated_at FROM documents WHERE collection = ",
    );
    builder.push_bind(collection.to_string());

    for filter in query.filters() {
        match filter {
            Filter::Eq { field, value } => {
                builder.push(" AND body -> ");
                builder.push_bind(field.clone());
                builder.push(" = ");
                builder.push_bind(Json(value.clone()));
            }
            Filter::StartsWith { field, prefix } => {
                builder.push(" AND body ->> ");
                builder.push_bind(field.clone());
                builder.push(" LIKE ");
                builder.push_bind(format!("{}%", escape_like(prefix)));
            }
        }
    }

    if let Some((field, order)) = query.ordering() {
        builder.push(" ORDER BY body -> ");
        builder.push_bind(field.to_string());
        builder.push(match order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });
    }

    if let Some(limit) = query.max_results() {
        builder.push(" LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    builder
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let Json(body): Json<Value> = row.try_get("body").map_err(classify)?;
    let etag: Uuid = row.try_get("etag").map_err(classify)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(classify)?;

    let Value::Object(mut doc) = body else {
        return Err(StoreError::InvalidDocument("stored body is not an object".into()));
    };
    doc.insert("_etag".into(), Value::String(etag.to_string()));
    doc.insert("_ts".into(), Value::from(updated_at.timestamp()));
    Ok(doc)
}

/// Map a driver error onto the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut => StoreError::Throttled,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => StoreError::Conflict,
            Some("40001" | "40P01" | "55P03") => StoreError::Throttled,
            _ => StoreError::backend(500, db.message()),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            StoreError::backend(503, err.to_string())
        }
        _ => StoreError::backend(500, err.to_string()),
    }
}
