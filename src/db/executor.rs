//! Query execution engine.
//!
//! This module provides query execution functionality with support for:
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Query timeouts
//!
//! # Architecture
//!
//! `QueryExecutor` is the capability the rest of the crate depends on
//! ("execute SQL, return rows"). `PoolExecutor` implements it over a `DbPool`,
//! with one submodule per backend:
//! - `mssql`: tiberius simple queries over the shared client
//! - `sqlite`: sqlx raw queries over the pool

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, DatabaseType, MAX_ROW_LIMIT, QueryResult,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Something that can run a SQL statement and hand back rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// SQL dialect spoken by the underlying database.
    fn dialect(&self) -> DatabaseType;

    /// Execute `sql` and return at most `limit` rows.
    async fn fetch(&self, sql: &str, limit: u32) -> DbResult<QueryResult>;

    /// Execute `sql` and return every row, ignoring the row cap.
    ///
    /// Only for internal reads whose size the caller cannot bound, such as
    /// the metadata catalog. Model-generated SQL always goes through `fetch`.
    async fn fetch_all(&self, sql: &str) -> DbResult<QueryResult> {
        self.fetch(sql, u32::MAX).await
    }
}

/// Query executor backed by a live connection.
pub struct PoolExecutor {
    pool: DbPool,
    default_timeout: Duration,
    default_limit: u32,
}

impl PoolExecutor {
    /// Create a new query executor with default settings.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS as u64),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(pool: DbPool, timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            pool,
            default_timeout: Duration::from_secs(timeout_secs),
            default_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    /// Default row limit applied by callers that have no better bound.
    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PoolExecutor {
    fn dialect(&self) -> DatabaseType {
        self.pool.db_type()
    }

    async fn fetch(&self, sql: &str, limit: u32) -> DbResult<QueryResult> {
        // Clamp limit to [1, MAX_ROW_LIMIT] to avoid edge case where limit=0 marks all results as "truncated"
        self.execute(sql, limit.clamp(1, MAX_ROW_LIMIT)).await
    }

    async fn fetch_all(&self, sql: &str) -> DbResult<QueryResult> {
        self.execute(sql, u32::MAX).await
    }
}

impl PoolExecutor {
    /// Run `sql` with the configured timeout, keeping at most `row_limit` rows.
    async fn execute(&self, sql: &str, row_limit: u32) -> DbResult<QueryResult> {
        let start = Instant::now();

        debug!(
            sql = %sql,
            limit = row_limit,
            timeout_secs = self.default_timeout.as_secs(),
            "Executing query"
        );

        match &self.pool {
            DbPool::MsSql(client) => {
                let rows = mssql::fetch_rows(client, sql, row_limit, self.default_timeout).await?;
                Ok(process_rows(rows, row_limit, start))
            }
            DbPool::SQLite(p) => {
                let rows = sqlite::fetch_rows(p, sql, row_limit, self.default_timeout).await?;
                Ok(process_rows(rows, row_limit, start))
            }
        }
    }
}

/// Process rows from any database type into a QueryResult.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return QueryResult::empty(execution_time_ms);
    }

    let columns = rows[0].get_column_metadata();
    let total_rows = rows.len();
    let has_more = total_rows > row_limit as usize;

    let json_rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .take(row_limit as usize)
        .map(|r| r.to_json_map())
        .collect();

    if has_more {
        warn!(
            total_rows = total_rows,
            limit = row_limit,
            "Query result truncated"
        );
    }

    QueryResult {
        columns,
        rows: json_rows,
        truncated: has_more,
        execution_time_ms,
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs() as u32)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mssql {
    use super::*;
    use crate::db::pool::MsSqlClient;
    use tiberius::Row;
    use tokio::sync::Mutex;

    pub async fn fetch_rows(
        client: &Mutex<MsSqlClient>,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<Row>> {
        let fetch_limit = (row_limit as usize).saturating_add(1);
        let rows_future = async {
            let mut client = client.lock().await;
            let stream = client.simple_query(sql).await?;
            // Only the first result set is of interest; the client drains
            // whatever is left before the next request.
            let results: Vec<tiberius::Result<Row>> = stream
                .into_row_stream()
                .take(fetch_limit)
                .collect()
                .await;
            results
                .into_iter()
                .map(|r| r.map_err(DbError::from))
                .collect::<DbResult<Vec<Row>>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(rows) => rows,
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>> {
        use sqlx::Executor;

        let fetch_limit = (row_limit as usize).saturating_add(1);
        let stream = pool.fetch(sql);
        let rows_future = stream.take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => results
                .into_iter()
                .map(|r| r.map_err(DbError::from))
                .collect(),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_executor() -> PoolExecutor {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        PoolExecutor::new(DbPool::SQLite(pool))
    }

    #[tokio::test]
    async fn test_executor_defaults() {
        let executor = memory_executor().await;
        assert_eq!(
            executor.default_timeout,
            Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS as u64)
        );
        assert_eq!(executor.default_limit(), DEFAULT_ROW_LIMIT);
        assert_eq!(executor.dialect(), DatabaseType::SQLite);
    }

    #[tokio::test]
    async fn test_fetch_all_ignores_row_cap() {
        let executor = memory_executor().await;
        let sql = format!(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < {}) SELECT i FROM n",
            MAX_ROW_LIMIT + 5
        );

        let capped = executor.fetch(&sql, u32::MAX).await.unwrap();
        assert_eq!(capped.row_count(), MAX_ROW_LIMIT as usize);
        assert!(capped.truncated);

        let all = executor.fetch_all(&sql).await.unwrap();
        assert_eq!(all.row_count(), MAX_ROW_LIMIT as usize + 5);
        assert!(!all.truncated);
    }

    #[tokio::test]
    async fn test_executor_limit_capped() {
        let executor = memory_executor().await;
        let executor = PoolExecutor::with_defaults(executor.pool().clone(), 30, 99999);
        assert_eq!(executor.default_limit(), MAX_ROW_LIMIT);
    }

    #[tokio::test]
    async fn test_fetch_truncates_at_limit() {
        let executor = memory_executor().await;
        let result = executor
            .fetch(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 10) SELECT x FROM n",
                3,
            )
            .await
            .unwrap();

        assert_eq!(result.row_count(), 3);
        assert!(result.truncated);
        assert_eq!(result.columns[0].name, "x");
        assert_eq!(result.rows[0]["x"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_fetch_reports_sql_errors() {
        let executor = memory_executor().await;
        let err = executor
            .fetch("SELECT * FROM does_not_exist", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
    }
}
