//! Persistence layer: connection pooling, schema migrations, the cache
//! store's five TTL'd tables, the bulk-dump catalogue, and order rows for
//! the booking state machine.

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Connection pool error
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

pub mod cache_store;
pub mod catalogue;
pub mod connection_pool;
pub mod migrations;
pub mod orders;

pub use connection_pool::{ConnectionPool, DatabaseConfig};
pub use migrations::{Migration, MigrationManager, MigrationVersion};

/// Open the pool, run pending migrations, and hand back a ready-to-use
/// connection pool. Called once from `main`.
pub async fn setup(database_url: &str) -> Result<ConnectionPool> {
    let config = DatabaseConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    let pool = ConnectionPool::new(config).await?;

    let manager = MigrationManager::new(pool.clone());
    manager.init().await?;
    migrations::init_default_migrations(&manager);
    manager.run_pending().await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setup_runs_migrations_against_an_in_memory_database() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let manager = MigrationManager::new(pool);
        migrations::init_default_migrations(&manager);
        manager.init().await.unwrap();
        assert_eq!(manager.pending_migrations().len(), 0);
    }
}
