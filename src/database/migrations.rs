//! Forward-only schema migration runner with version tracking and checksums.
//!
//! Migrations are plain SQL, registered in order at startup and applied once;
//! the `_migrations` table records what ran. Rollback is supported for
//! operational use but the gateway itself only ever calls `run_pending`.

use crate::database::{connection_pool::ConnectionPool, DatabaseError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Migration version (timestamp-based)
pub type MigrationVersion = i64;

/// Migration trait
#[async_trait::async_trait]
pub trait Migration: Send + Sync {
    /// Get the migration version
    fn version(&self) -> MigrationVersion;

    /// Get the migration name
    fn name(&self) -> &str;

    /// Get the migration description
    fn description(&self) -> &str;

    /// Execute the migration (up)
    async fn up(&self, pool: &ConnectionPool) -> Result<()>;

    /// Rollback the migration (down)
    async fn down(&self, pool: &ConnectionPool) -> Result<()>;

    /// Check if this migration can be safely rolled back
    fn is_reversible(&self) -> bool {
        true
    }
}

/// SQL-based migration
pub struct SqlMigration {
    version: MigrationVersion,
    name: String,
    description: String,
    up_sql: String,
    down_sql: Option<String>,
}

impl SqlMigration {
    /// Create a new SQL migration
    pub fn new(
        version: MigrationVersion,
        name: impl Into<String>,
        description: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            description: description.into(),
            up_sql: up_sql.into(),
            down_sql,
        }
    }
}

#[async_trait::async_trait]
impl Migration for SqlMigration {
    fn version(&self) -> MigrationVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn up(&self, pool: &ConnectionPool) -> Result<()> {
        pool.execute(sqlx::query(&self.up_sql))
            .await
            .map_err(|e| DatabaseError::Migration(format!("Migration up failed: {}", e)))?;
        Ok(())
    }

    async fn down(&self, pool: &ConnectionPool) -> Result<()> {
        if let Some(down_sql) = &self.down_sql {
            pool.execute(sqlx::query(down_sql))
                .await
                .map_err(|e| DatabaseError::Migration(format!("Migration down failed: {}", e)))?;
            Ok(())
        } else {
            Err(DatabaseError::Migration(
                "Migration is not reversible".to_string(),
            ))
        }
    }

    fn is_reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

/// Migration record in the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
struct MigrationRecord {
    version: i64,
    name: String,
    description: String,
    applied_at: String,
    checksum: String,
}

/// Migration manager
pub struct MigrationManager {
    /// Connection pool
    pool: ConnectionPool,

    /// Registered migrations
    migrations: Arc<RwLock<HashMap<MigrationVersion, Box<dyn Migration>>>>,

    /// Migration history
    history: Arc<RwLock<Vec<MigrationRecord>>>,
}

impl MigrationManager {
    /// Create a new migration manager
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            migrations: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Initialize the migrations table
    pub async fn init(&self) -> Result<()> {
        let create_table_sql = r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                checksum TEXT NOT NULL
            )
        "#;

        self.pool
            .execute(sqlx::query(create_table_sql))
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to create migrations table: {}", e)))?;

        // Load migration history
        self.load_history().await?;

        Ok(())
    }

    /// Register a migration
    pub fn register<M: Migration + 'static>(&self, migration: M) {
        let version = migration.version();
        self.migrations.write().insert(version, Box::new(migration));
    }

    /// Load migration history from the database
    async fn load_history(&self) -> Result<()> {
        let records: Vec<MigrationRecord> = self
            .pool
            .fetch_all(sqlx::query_as("SELECT * FROM _migrations ORDER BY version"))
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to load migration history: {}", e)))?;

        *self.history.write() = records;

        Ok(())
    }

    /// Get pending migrations
    pub fn pending_migrations(&self) -> Vec<MigrationVersion> {
        let applied_versions: Vec<i64> = self
            .history
            .read()
            .iter()
            .map(|r| r.version)
            .collect();

        let mut pending: Vec<MigrationVersion> = self
            .migrations
            .read()
            .keys()
            .filter(|v| !applied_versions.contains(v))
            .copied()
            .collect();

        pending.sort();
        pending
    }

    /// Run all pending migrations
    pub async fn run_pending(&self) -> Result<()> {
        let pending = self.pending_migrations();

        if pending.is_empty() {
            tracing::info!("No pending migrations");
            return Ok(());
        }

        tracing::info!("Running {} pending migrations", pending.len());

        for version in pending {
            self.migrate_up(version).await?;
        }

        tracing::info!("All migrations completed successfully");

        Ok(())
    }

    /// Run a specific migration up
    pub async fn migrate_up(&self, version: MigrationVersion) -> Result<()> {
        let migration = {
            let migrations = self.migrations.read();
            migrations
                .get(&version)
                .ok_or_else(|| {
                    DatabaseError::Migration(format!("Migration {} not found", version))
                })?;

            // We need to clone the reference here since we can't hold the lock across await
            // For now, we'll access it again inside the transaction
            true
        };

        let migrations = self.migrations.read();
        let migration = migrations.get(&version).unwrap();

        tracing::info!(
            "Running migration {}: {}",
            version,
            migration.name()
        );

        // Begin transaction
        let mut tx = self.pool.begin().await?;

        // Execute migration
        migration.up(&self.pool).await?;

        // Record migration
        let checksum = self.calculate_checksum(version);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO _migrations (version, name, description, applied_at, checksum) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(version)
        .bind(migration.name())
        .bind(migration.description())
        .bind(&now)
        .bind(&checksum)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to record migration: {}", e)))?;

        // Commit transaction
        tx.commit().await
            .map_err(|e| DatabaseError::Migration(format!("Failed to commit migration: {}", e)))?;

        // Reload history
        self.load_history().await?;

        tracing::info!("Migration {} completed", version);

        Ok(())
    }

    /// Rollback a migration
    pub async fn migrate_down(&self, version: MigrationVersion) -> Result<()> {
        // Check if migration is applied
        let is_applied = self
            .history
            .read()
            .iter()
            .any(|r| r.version == version);

        if !is_applied {
            return Err(DatabaseError::Migration(format!(
                "Migration {} is not applied",
                version
            )));
        }

        let migrations = self.migrations.read();
        let migration = migrations
            .get(&version)
            .ok_or_else(|| DatabaseError::Migration(format!("Migration {} not found", version)))?;

        if !migration.is_reversible() {
            return Err(DatabaseError::Migration(format!(
                "Migration {} is not reversible",
                version
            )));
        }

        tracing::info!(
            "Rolling back migration {}: {}",
            version,
            migration.name()
        );

        // Begin transaction
        let mut tx = self.pool.begin().await?;

        // Execute rollback
        migration.down(&self.pool).await?;

        // Remove migration record
        sqlx::query("DELETE FROM _migrations WHERE version = ?")
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to remove migration record: {}", e)))?;

        // Commit transaction
        tx.commit().await
            .map_err(|e| DatabaseError::Migration(format!("Failed to commit rollback: {}", e)))?;

        // Reload history
        self.load_history().await?;

        tracing::info!("Migration {} rolled back", version);

        Ok(())
    }

    /// Rollback the last N migrations
    pub async fn rollback(&self, count: usize) -> Result<()> {
        let mut applied_versions: Vec<i64> = self
            .history
            .read()
            .iter()
            .map(|r| r.version)
            .collect();

        applied_versions.sort();
        applied_versions.reverse();

        let to_rollback = applied_versions.into_iter().take(count);

        for version in to_rollback {
            self.migrate_down(version).await?;
        }

        Ok(())
    }

    /// Get migration status
    pub fn status(&self) -> MigrationStatus {
        let total = self.migrations.read().len();
        let applied = self.history.read().len();
        let pending = self.pending_migrations().len();

        let history: Vec<MigrationInfo> = self
            .history
            .read()
            .iter()
            .map(|r| MigrationInfo {
                version: r.version,
                name: r.name.clone(),
                description: r.description.clone(),
                applied_at: Some(r.applied_at.clone()),
                is_applied: true,
            })
            .collect();

        let pending_info: Vec<MigrationInfo> = {
            let migrations = self.migrations.read();
            self.pending_migrations()
                .into_iter()
                .filter_map(|v| {
                    migrations.get(&v).map(|m| MigrationInfo {
                        version: v,
                        name: m.name().to_string(),
                        description: m.description().to_string(),
                        applied_at: None,
                        is_applied: false,
                    })
                })
                .collect()
        };

        MigrationStatus {
            total,
            applied,
            pending,
            history,
            pending_migrations: pending_info,
        }
    }

    /// Calculate checksum for a migration
    fn calculate_checksum(&self, version: MigrationVersion) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(version.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Reset all migrations (dangerous!)
    pub async fn reset(&self) -> Result<()> {
        tracing::warn!("Resetting all migrations - this will drop and recreate the database schema");

        // Rollback all migrations
        let count = self.history.read().len();
        self.rollback(count).await?;

        Ok(())
    }
}

/// Migration status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Total number of migrations
    pub total: usize,

    /// Number of applied migrations
    pub applied: usize,

    /// Number of pending migrations
    pub pending: usize,

    /// Migration history
    pub history: Vec<MigrationInfo>,

    /// Pending migrations
    pub pending_migrations: Vec<MigrationInfo>,
}

/// Migration information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    /// Migration version
    pub version: MigrationVersion,

    /// Migration name
    pub name: String,

    /// Migration description
    pub description: String,

    /// When this migration was applied
    pub applied_at: Option<String>,

    /// Whether this migration is applied
    pub is_applied: bool,
}

/// Register the gateway's schema on a freshly constructed manager.
pub fn init_default_migrations(manager: &MigrationManager) {
    manager.register(SqlMigration::new(
        20260101000001,
        "create_destination_cache",
        "Resolved destination slug/name to upstream region_id, with a TTL",
        r#"
            CREATE TABLE destination_cache (
                normalized_name TEXT PRIMARY KEY,
                region_id INTEGER NOT NULL,
                region_name TEXT,
                last_verified_at TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            );
        "#,
        Some("DROP TABLE destination_cache;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000002,
        "create_search_cache",
        "Search results keyed by the deterministic search signature",
        r#"
            CREATE TABLE search_cache (
                signature TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_search_cache_expires ON search_cache(expires_at);
        "#,
        Some("DROP TABLE search_cache;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000003,
        "create_hotel_static_cache",
        "Per-hotel static attributes fetched from hotel_info, with a TTL",
        r#"
            CREATE TABLE hotel_static_cache (
                hotel_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_hotel_static_cache_expires ON hotel_static_cache(expires_at);
        "#,
        Some("DROP TABLE hotel_static_cache;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000004,
        "create_hotel_catalogue",
        "Bulk-dump hotel static attributes, no TTL, refreshed wholesale",
        r#"
            CREATE TABLE hotel_catalogue (
                hotel_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        Some("DROP TABLE hotel_catalogue;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000005,
        "create_filter_values_cache",
        "Filter facets for a region, with a TTL",
        r#"
            CREATE TABLE filter_values_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_filter_values_cache_expires ON filter_values_cache(expires_at);
        "#,
        Some("DROP TABLE filter_values_cache;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000006,
        "create_autocomplete_cache",
        "Autocomplete suggestions keyed by an md5 digest of the query, with a TTL",
        r#"
            CREATE TABLE autocomplete_cache (
                query_digest TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_autocomplete_cache_expires ON autocomplete_cache(expires_at);
        "#,
        Some("DROP TABLE autocomplete_cache;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000007,
        "create_orders",
        "Booking state machine rows, one per partner_order_id",
        r#"
            CREATE TABLE orders (
                partner_order_id TEXT PRIMARY KEY,
                upstream_order_id INTEGER,
                upstream_item_id INTEGER,
                book_hash TEXT NOT NULL,
                state TEXT NOT NULL,
                last_status TEXT,
                request_payload TEXT NOT NULL,
                failure_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX idx_orders_upstream_order_id ON orders(upstream_order_id);
            CREATE INDEX idx_orders_state ON orders(state);
        "#,
        Some("DROP TABLE orders;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000008,
        "create_region_catalogue",
        "Bulk-dump region id/name index, no TTL, backs name-substring lookups",
        r#"
            CREATE TABLE region_catalogue (
                region_id INTEGER PRIMARY KEY,
                region_name TEXT NOT NULL
            );
            CREATE INDEX idx_region_catalogue_name ON region_catalogue(region_name);
        "#,
        Some("DROP TABLE region_catalogue;".to_string()),
    ));

    manager.register(SqlMigration::new(
        20260101000009,
        "add_booking_hash_and_payment_to_orders",
        "Persist the prebook-returned booking_hash and the chosen payment_type/guest list",
        r#"
            ALTER TABLE orders ADD COLUMN booking_hash TEXT;
            ALTER TABLE orders ADD COLUMN payment_type TEXT;
            ALTER TABLE orders ADD COLUMN guests TEXT;
        "#,
        None,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migration_manager() {
        use crate::database::connection_pool::DatabaseConfig;

        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };

        let pool = ConnectionPool::new(config).await.unwrap();
        let manager = MigrationManager::new(pool);

        // Initialize
        assert!(manager.init().await.is_ok());

        // Register a test migration
        manager.register(SqlMigration::new(
            1,
            "test",
            "Test migration",
            "CREATE TABLE test (id INTEGER PRIMARY KEY)",
            Some("DROP TABLE test".to_string()),
        ));

        // Check pending
        let pending = manager.pending_migrations();
        assert_eq!(pending.len(), 1);

        // Run migration
        assert!(manager.run_pending().await.is_ok());

        // Check no pending
        let pending = manager.pending_migrations();
        assert_eq!(pending.len(), 0);

        // Check status
        let status = manager.status();
        assert_eq!(status.applied, 1);
        assert_eq!(status.pending, 0);
    }
}
