//! SQLite implementation of the store gateway.

use async_trait::async_trait;
use sqlx::{Column, Row, SqlitePool};

use super::{QueryGateway, Result, StoreError, StoreQuery, TabularRow};

/// SQLite-backed query gateway.
pub struct SqliteQueryGateway {
    pool: SqlitePool,
}

impl SqliteQueryGateway {
    /// Create a gateway over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .map_err(classify)?;
        Ok(Self::new(pool))
    }

    fn prepare<'q>(
        query: &'q StoreQuery,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let mut prepared = sqlx::query(query.sql());
        for bind in query.binds() {
            prepared = prepared.bind(bind.value.as_str());
        }
        prepared
    }
}

/// Map driver errors into the structured store taxonomy.
///
/// SQLite reports a lost creation race as a database-level error whose
/// message names the duplicate object; that condition is surfaced as
/// `AlreadyExists` so callers never inspect message text themselves.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        let message = db.message();
        if message.contains("already exists") {
            return StoreError::AlreadyExists(message.to_string());
        }
    }
    StoreError::Database(err.to_string())
}

#[async_trait]
impl QueryGateway for SqliteQueryGateway {
    async fn execute_scalar(&self, query: &StoreQuery) -> Result<i64> {
        let row = Self::prepare(query)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        let value: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::MalformedResult(e.to_string()))?;
        Ok(value)
    }

    async fn execute(&self, query: &StoreQuery) -> Result<()> {
        Self::prepare(query)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn execute_tabular(&self, query: &StoreQuery) -> Result<Vec<TabularRow>> {
        let rows = Self::prepare(query)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut columns = Vec::with_capacity(row.columns().len());
            for column in row.columns() {
                let value: String = row
                    .try_get(column.ordinal())
                    .map_err(|e| StoreError::MalformedResult(e.to_string()))?;
                columns.push((column.name().to_string(), value));
            }
            result.push(TabularRow::from_columns(columns));
        }
        Ok(result)
    }
}
