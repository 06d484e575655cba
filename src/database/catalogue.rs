//! Catalogue Store: the bulk-dump join used to enrich live search
//! results with static hotel attributes without a per-hotel upstream call.
//!
//! Absence from the catalogue is expected and non-fatal — a hotel that
//! hasn't been ingested by the bulk dump yet is simply left unenriched.

use std::collections::HashMap;

use chrono::Utc;
use serde_json;

use crate::database::{ConnectionPool, DatabaseError, Result};
use crate::upstream::types::HotelStatic;

#[derive(sqlx::FromRow)]
struct CatalogueRow {
    hotel_id: i64,
    payload: String,
}

#[derive(sqlx::FromRow)]
struct RegionRow {
    region_id: i64,
    region_name: String,
}

/// Read-through accessor over the `hotel_catalogue` table.
pub struct CatalogueStore {
    pool: ConnectionPool,
}

impl CatalogueStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Look up every id we have catalogue data for; ids with no row are
    /// simply absent from the returned map.
    pub async fn lookup_hotels(&self, ids: &[i64]) -> Result<HashMap<i64, HotelStatic>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT hotel_id, payload FROM hotel_catalogue WHERE hotel_id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, CatalogueRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(self.pool.inner())
            .await
            .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let static_info: HotelStatic = serde_json::from_str(&row.payload)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
            out.insert(row.hotel_id, static_info);
        }
        Ok(out)
    }

    /// Substring/case-insensitive match over the bulk-dump region name
    /// index. Among matches, the shortest region_name wins — it is the
    /// tightest containing match for an ambiguous query like "york".
    pub async fn lookup_region_by_name(&self, query: &str) -> Result<Option<(i64, String)>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let row: Option<RegionRow> = sqlx::query_as(
            r#"
            SELECT region_id, region_name FROM region_catalogue
            WHERE LOWER(region_name) LIKE ?
            ORDER BY LENGTH(region_name) ASC
            LIMIT 1
            "#,
        )
        .bind(pattern)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        Ok(row.map(|r| (r.region_id, r.region_name)))
    }

    /// Upsert one region's id/name pair, as ingested from a bulk dump.
    pub async fn upsert_region(&self, region_id: i64, region_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO region_catalogue (region_id, region_name)
            VALUES (?, ?)
            ON CONFLICT(region_id) DO UPDATE SET region_name = excluded.region_name
            "#,
        )
        .bind(region_id)
        .bind(region_name)
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    /// Upsert one hotel's static attributes, as ingested from a bulk dump.
    pub async fn upsert(&self, hotel: &HotelStatic) -> Result<()> {
        let payload = serde_json::to_string(hotel)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO hotel_catalogue (hotel_id, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(hotel_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(hotel.hotel_id)
        .bind(payload)
        .bind(now)
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{setup, migrations::MigrationManager};

    fn sample(hotel_id: i64) -> HotelStatic {
        HotelStatic {
            hotel_id,
            name: format!("Hotel {hotel_id}"),
            address: None,
            city: None,
            country: None,
            star_rating: None,
            latitude: None,
            longitude: None,
            images: vec![],
            amenities: vec![],
            description: None,
            check_in_time: None,
            check_out_time: None,
            kind: None,
            raw_data: None,
        }
    }

    #[tokio::test]
    async fn lookup_returns_only_known_ids() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let _manager = MigrationManager::new(pool.clone());
        let store = CatalogueStore::new(pool);
        store.upsert(&sample(1)).await.unwrap();

        let found = store.lookup_hotels(&[1, 2]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&1));
        assert!(!found.contains_key(&2));
    }

    #[tokio::test]
    async fn lookup_with_no_ids_is_a_no_op() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = CatalogueStore::new(pool);
        let found = store.lookup_hotels(&[]).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn region_lookup_matches_by_substring_and_prefers_the_tightest_hit() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = CatalogueStore::new(pool);
        store.upsert_region(10, "New York").await.unwrap();
        store.upsert_region(11, "New York Metro Area").await.unwrap();

        let found = store.lookup_region_by_name("new york").await.unwrap();
        assert_eq!(found, Some((10, "New York".to_string())));

        assert!(store.lookup_region_by_name("nowhere").await.unwrap().is_none());
    }
}
