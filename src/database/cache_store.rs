//! Cache Store: five logical tables, each with TTL semantics handled
//! here in application code rather than by the database.
//!
//! Read contract: a row is only returned if `now < expires_at`; an expired
//! row is deleted as a side effect and the caller is told it was a miss.
//! `destination_cache` is the exception — it has no TTL and is only ever
//! invalidated explicitly by the resolver on a mismatch.
//!
//! Hotel-static entries are keyed by `hotel_id` alone: the upstream content
//! API this gateway talks to does not vary by locale in practice, so a
//! `(hotel_id, language)` composite key collapses to a single default
//! locale per hotel.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{ConnectionPool, DatabaseError, Result};
use crate::upstream::types::{HotelStatic, Rate};

const SEARCH_CACHE_TTL: ChronoDuration = ChronoDuration::minutes(30);
const HOTEL_STATIC_TTL: ChronoDuration = ChronoDuration::days(7);
const FILTER_VALUES_TTL: ChronoDuration = ChronoDuration::hours(24);
const AUTOCOMPLETE_TTL: ChronoDuration = ChronoDuration::hours(24);

/// One hotel's rates plus its (possibly absent) static attributes, as stored
/// inside a search-cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedHotelEntry {
    pub min_rate: f64,
    pub max_rate: f64,
    pub rates: Vec<Rate>,
    pub static_attributes: Option<HotelStatic>,
}

/// Everything needed to reconstruct a search response without calling
/// upstream again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCacheEntry {
    pub params: serde_json::Value,
    pub region_id: i64,
    pub hotel_ids: Vec<i64>,
    pub rates_index: HashMap<i64, CachedHotelEntry>,
}

/// A destination resolution, as persisted across process restarts.
#[derive(Debug, Clone)]
pub struct DestinationEntry {
    pub region_id: i64,
    pub region_name: Option<String>,
    pub hit_count: i64,
}

#[derive(sqlx::FromRow)]
struct DestinationRow {
    region_id: i64,
    region_name: Option<String>,
    hit_count: i64,
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    payload: String,
    expires_at: String,
    created_at: String,
}

/// Database-backed TTL cache over the gateway's five logical tables.
pub struct CacheStore {
    pool: ConnectionPool,
}

impl CacheStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    // -- destination_cache --------------------------------------------

    pub async fn get_destination(&self, normalized_name: &str) -> Result<Option<DestinationEntry>> {
        let row: Option<DestinationRow> = sqlx::query_as(
            "SELECT region_id, region_name, hit_count FROM destination_cache WHERE normalized_name = ?",
        )
        .bind(normalized_name)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        Ok(row.map(|r| DestinationEntry {
            region_id: r.region_id,
            region_name: r.region_name,
            hit_count: r.hit_count,
        }))
    }

    pub async fn put_destination(
        &self,
        normalized_name: &str,
        region_id: i64,
        region_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO destination_cache (normalized_name, region_id, region_name, last_verified_at, hit_count)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(normalized_name) DO UPDATE SET
                region_id = excluded.region_id,
                region_name = excluded.region_name,
                last_verified_at = excluded.last_verified_at
            "#,
        )
        .bind(normalized_name)
        .bind(region_id)
        .bind(region_name)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    /// Record a cache hit: bumps the hit counter and `last_verified_at`.
    pub async fn touch_destination(&self, normalized_name: &str) -> Result<()> {
        sqlx::query(
            "UPDATE destination_cache SET hit_count = hit_count + 1, last_verified_at = ? WHERE normalized_name = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(normalized_name)
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    pub async fn invalidate_destination(&self, normalized_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM destination_cache WHERE normalized_name = ?")
            .bind(normalized_name)
            .execute(self.pool.inner())
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    // -- search_cache ----------------------------------------------------

    pub async fn get_search(&self, signature: &str) -> Result<Option<SearchCacheEntry>> {
        Ok(self.get_search_with_age(signature).await?.map(|(entry, _)| entry))
    }

    /// Same as [`Self::get_search`] but also returns how many seconds ago
    /// the entry was written, for `meta.cache_age`.
    pub async fn get_search_with_age(&self, signature: &str) -> Result<Option<(SearchCacheEntry, i64)>> {
        self.get_payload_with_age("search_cache", "signature", signature, |row| {
            serde_json::from_str(&row.payload).map_err(|e| DatabaseError::Serialization(e.to_string()))
        })
        .await
    }

    pub async fn put_search(&self, signature: &str, entry: &SearchCacheEntry) -> Result<()> {
        self.put_payload("search_cache", "signature", signature, entry, SEARCH_CACHE_TTL)
            .await
    }

    pub async fn hit_search(&self, signature: &str) -> Result<()> {
        self.bump_hit_count("search_cache", "signature", signature).await
    }

    // -- hotel_static_cache ------------------------------------------------

    pub async fn get_hotel_static(&self, hotel_id: i64) -> Result<Option<HotelStatic>> {
        self.get_payload("hotel_static_cache", "hotel_id", &hotel_id.to_string(), |row| {
            serde_json::from_str(&row.payload).map_err(|e| DatabaseError::Serialization(e.to_string()))
        })
        .await
    }

    pub async fn put_hotel_static(&self, hotel: &HotelStatic) -> Result<()> {
        self.put_payload(
            "hotel_static_cache",
            "hotel_id",
            &hotel.hotel_id.to_string(),
            hotel,
            HOTEL_STATIC_TTL,
        )
        .await
    }

    // -- filter_values_cache -----------------------------------------------
    //
    // The upstream filter-values list is global, not per-region, so this
    // table holds a single row under a fixed key.

    const FILTER_VALUES_KEY: &'static str = "global";

    pub async fn get_filter_values(&self) -> Result<Option<serde_json::Value>> {
        self.get_payload("filter_values_cache", "cache_key", Self::FILTER_VALUES_KEY, |row| {
            serde_json::from_str(&row.payload).map_err(|e| DatabaseError::Serialization(e.to_string()))
        })
        .await
    }

    pub async fn put_filter_values(&self, values: &serde_json::Value) -> Result<()> {
        self.put_payload(
            "filter_values_cache",
            "cache_key",
            Self::FILTER_VALUES_KEY,
            values,
            FILTER_VALUES_TTL,
        )
        .await
    }

    // -- autocomplete_cache ------------------------------------------------

    pub async fn get_autocomplete(&self, query_digest: &str) -> Result<Option<serde_json::Value>> {
        self.get_payload("autocomplete_cache", "query_digest", query_digest, |row| {
            serde_json::from_str(&row.payload).map_err(|e| DatabaseError::Serialization(e.to_string()))
        })
        .await
    }

    pub async fn put_autocomplete(&self, query_digest: &str, results: &serde_json::Value) -> Result<()> {
        self.put_payload(
            "autocomplete_cache",
            "query_digest",
            query_digest,
            results,
            AUTOCOMPLETE_TTL,
        )
        .await
    }

    // -- shared machinery --------------------------------------------------

    async fn get_payload<T>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        parse: impl FnOnce(&PayloadRow) -> Result<T>,
    ) -> Result<Option<T>> {
        Ok(self
            .get_payload_with_age(table, key_column, key, parse)
            .await?
            .map(|(value, _)| value))
    }

    async fn get_payload_with_age<T>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        parse: impl FnOnce(&PayloadRow) -> Result<T>,
    ) -> Result<Option<(T, i64)>> {
        let sql = format!("SELECT payload, expires_at, created_at FROM {table} WHERE {key_column} = ?");
        let row: Option<PayloadRow> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(self.pool.inner())
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let expires_at: DateTime<Utc> = row
            .expires_at
            .parse()
            .map_err(|_| DatabaseError::Serialization("invalid expires_at timestamp".to_string()))?;

        if Utc::now() >= expires_at {
            let delete_sql = format!("DELETE FROM {table} WHERE {key_column} = ?");
            sqlx::query(&delete_sql)
                .bind(key)
                .execute(self.pool.inner())
                .await
                .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
            return Ok(None);
        }

        let created_at: DateTime<Utc> = row
            .created_at
            .parse()
            .map_err(|_| DatabaseError::Serialization("invalid created_at timestamp".to_string()))?;
        let age_secs = (Utc::now() - created_at).num_seconds().max(0);

        let value = parse(&row)?;
        Ok(Some((value, age_secs)))
    }

    async fn put_payload<T: Serialize>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        value: &T,
        ttl: ChronoDuration,
    ) -> Result<()> {
        let payload =
            serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now();
        let expires_at = now + ttl;

        let sql = format!(
            r#"
            INSERT INTO {table} ({key_column}, payload, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT({key_column}) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(payload)
            .bind(expires_at.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(self.pool.inner())
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    async fn bump_hit_count(&self, table: &str, key_column: &str, key: &str) -> Result<()> {
        let sql = format!("UPDATE {table} SET hit_count = hit_count + 1 WHERE {key_column} = ?");
        sqlx::query(&sql)
            .bind(key)
            .execute(self.pool.inner())
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    /// Delete every expired row across all TTL'd tables. Best-effort
    /// background hygiene; correctness does not depend on this running
    /// since `get_*` also checks expiry inline.
    pub async fn sweep(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut total = 0u64;
        for table in [
            "search_cache",
            "hotel_static_cache",
            "filter_values_cache",
            "autocomplete_cache",
        ] {
            let sql = format!("DELETE FROM {table} WHERE expires_at < ?");
            let result = sqlx::query(&sql)
                .bind(&now)
                .execute(self.pool.inner())
                .await
                .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
            total += result.rows_affected();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::setup;

    #[tokio::test]
    async fn destination_cache_has_no_ttl_and_tracks_hits() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = CacheStore::new(pool);

        store.put_destination("paris", 2621, Some("Paris")).await.unwrap();
        store.touch_destination("paris").await.unwrap();
        store.touch_destination("paris").await.unwrap();

        let entry = store.get_destination("paris").await.unwrap().unwrap();
        assert_eq!(entry.region_id, 2621);
        assert_eq!(entry.hit_count, 2);
    }

    #[tokio::test]
    async fn search_cache_round_trips_an_entry() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = CacheStore::new(pool);

        let entry = SearchCacheEntry {
            params: serde_json::json!({"region_id": 2621}),
            region_id: 2621,
            hotel_ids: vec![1, 2, 3],
            rates_index: HashMap::new(),
        };
        store.put_search("sig-1", &entry).await.unwrap();

        let fetched = store.get_search("sig-1").await.unwrap().unwrap();
        assert_eq!(fetched.hotel_ids, vec![1, 2, 3]);
        assert!(store.get_search("sig-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_row_is_deleted_on_read() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = CacheStore::new(pool);

        let entry = SearchCacheEntry {
            params: serde_json::json!({}),
            region_id: 1,
            hotel_ids: vec![],
            rates_index: HashMap::new(),
        };
        store.put_search("sig-stale", &entry).await.unwrap();

        sqlx::query("UPDATE search_cache SET expires_at = ? WHERE signature = ?")
            .bind((Utc::now() - ChronoDuration::minutes(1)).to_rfc3339())
            .bind("sig-stale")
            .execute(store.pool.inner())
            .await
            .unwrap();

        assert!(store.get_search("sig-stale").await.unwrap().is_none());

        let row: Option<(String,)> = sqlx::query_as("SELECT signature FROM search_cache WHERE signature = ?")
            .bind("sig-stale")
            .fetch_optional(store.pool.inner())
            .await
            .unwrap();
        assert!(row.is_none());
    }
}
