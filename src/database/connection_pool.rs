//! Connection pooling: a thin wrapper around `sqlx::SqlitePool` that applies
//! the gateway's pragmas once at startup and is cheap to `Clone` so every
//! store can hold its own handle.

use crate::database::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://voyagegate.db" or "postgres://...")
    pub url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout: u64,

    /// Idle timeout in seconds (how long a connection can be idle before being closed)
    pub idle_timeout: u64,

    /// Maximum lifetime of a connection in seconds
    pub max_lifetime: u64,

    /// Enable statement caching
    pub statement_cache_capacity: usize,

    /// Enable WAL mode for SQLite
    pub enable_wal: bool,

    /// Busy timeout for SQLite in milliseconds
    pub busy_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://voyagegate.db".to_string(),
            min_connections: 5,
            max_connections: 100,
            connect_timeout: 30,
            idle_timeout: 600,
            max_lifetime: 3600,
            statement_cache_capacity: 128,
            enable_wal: true,
            busy_timeout: 5000,
        }
    }
}

/// Connection pool
#[derive(Clone)]
pub struct ConnectionPool {
    pool: SqlitePool,
}

impl ConnectionPool {
    /// Create a new connection pool
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&config.url.replace("sqlite://", ""))
            .create_if_missing(true)
            .statement_cache_capacity(config.statement_cache_capacity)
            .busy_timeout(Duration::from_millis(config.busy_timeout));

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout)))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime)))
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;

        if config.enable_wal {
            sqlx::query("PRAGMA journal_mode=WAL")
                .execute(&pool)
                .await
                .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;
        }

        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;

        sqlx::query("PRAGMA cache_size=-64000") // 64MB cache
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;

        sqlx::query("PRAGMA temp_store=MEMORY")
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying SQLx pool
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a query
    pub async fn execute<'q, Q>(&self, query: Q) -> Result<sqlx::sqlite::SqliteQueryResult>
    where
        Q: sqlx::Execute<'q, sqlx::Sqlite>,
    {
        query
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))
    }

    /// Fetch all rows from a query
    pub async fn fetch_all<'q, Q, O>(&self, query: Q) -> Result<Vec<O>>
    where
        Q: sqlx::Execute<'q, sqlx::Sqlite>,
        O: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))
    }

    /// Fetch one row from a query
    pub async fn fetch_one<'q, Q, O>(&self, query: Q) -> Result<O>
    where
        Q: sqlx::Execute<'q, sqlx::Sqlite>,
        O: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))
    }

    /// Begin a transaction
    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DatabaseError::ConnectionPool(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_pool_creation() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };

        let pool = ConnectionPool::new(config).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_query_execution() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };

        let pool = ConnectionPool::new(config).await.unwrap();

        let result = pool
            .execute(sqlx::query("CREATE TABLE test (id INTEGER PRIMARY KEY)"))
            .await;
        assert!(result.is_ok());
    }
}
