//! Persistence for the booking state machine's `orders` table.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::database::{ConnectionPool, DatabaseError, Result};

/// A booking's position in the NEW → PRICED → FORMED → PROCESSING →
/// {CONFIRMED, FAILED} / CANCELLED state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    New,
    Priced,
    Formed,
    Processing,
    Confirmed,
    Failed,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::New => "new",
            OrderState::Priced => "priced",
            OrderState::Formed => "formed",
            OrderState::Processing => "processing",
            OrderState::Confirmed => "confirmed",
            OrderState::Failed => "failed",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Confirmed | OrderState::Failed | OrderState::Cancelled)
    }
}

impl std::str::FromStr for OrderState {
    type Err = DatabaseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "new" => OrderState::New,
            "priced" => OrderState::Priced,
            "formed" => OrderState::Formed,
            "processing" => OrderState::Processing,
            "confirmed" => OrderState::Confirmed,
            "failed" => OrderState::Failed,
            "cancelled" => OrderState::Cancelled,
            other => return Err(DatabaseError::Serialization(format!("unknown order state {other}"))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub partner_order_id: String,
    pub upstream_order_id: Option<i64>,
    pub upstream_item_id: Option<i64>,
    pub book_hash: String,
    pub booking_hash: Option<String>,
    pub state: OrderState,
    pub payment_type: Option<String>,
    pub guests: Option<serde_json::Value>,
    pub last_status: Option<String>,
    pub request_payload: serde_json::Value,
    pub failure_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    partner_order_id: String,
    upstream_order_id: Option<i64>,
    upstream_item_id: Option<i64>,
    book_hash: String,
    booking_hash: Option<String>,
    state: String,
    payment_type: Option<String>,
    guests: Option<String>,
    last_status: Option<String>,
    request_payload: String,
    failure_reason: Option<String>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> std::result::Result<Self, Self::Error> {
        Ok(OrderRecord {
            partner_order_id: row.partner_order_id,
            upstream_order_id: row.upstream_order_id,
            upstream_item_id: row.upstream_item_id,
            book_hash: row.book_hash,
            booking_hash: row.booking_hash,
            state: row.state.parse()?,
            payment_type: row.payment_type,
            guests: row
                .guests
                .map(|g| serde_json::from_str(&g))
                .transpose()
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            last_status: row.last_status,
            request_payload: serde_json::from_str(&row.request_payload)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            failure_reason: row.failure_reason,
        })
    }
}

/// The subset of `advance`'s columns a given transition actually touches;
/// unset fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate<'a> {
    pub upstream_order_id: Option<i64>,
    pub upstream_item_id: Option<i64>,
    pub booking_hash: Option<&'a str>,
    pub payment_type: Option<&'a str>,
    pub guests: Option<&'a serde_json::Value>,
    pub last_status: Option<&'a str>,
    pub failure_reason: Option<&'a str>,
}

/// Thin CRUD layer over the `orders` table. `BookingMachine` owns the
/// transition logic; this type only persists rows.
pub struct OrderStore {
    pool: ConnectionPool,
}

impl OrderStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub async fn insert_new(
        &self,
        partner_order_id: &str,
        book_hash: &str,
        request_payload: &serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(request_payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO orders (partner_order_id, book_hash, state, request_payload, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(partner_order_id)
        .bind(book_hash)
        .bind(OrderState::New.as_str())
        .bind(payload)
        .bind(&now)
        .bind(&now)
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, partner_order_id: &str) -> Result<Option<OrderRecord>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT partner_order_id, upstream_order_id, upstream_item_id, book_hash,
                   booking_hash, state, payment_type, guests, last_status, request_payload,
                   failure_reason
            FROM orders WHERE partner_order_id = ?
            "#,
        )
        .bind(partner_order_id)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        row.map(OrderRecord::try_from).transpose()
    }

    pub async fn find_by_upstream_order_id(&self, upstream_order_id: i64) -> Result<Option<OrderRecord>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT partner_order_id, upstream_order_id, upstream_item_id, book_hash,
                   booking_hash, state, payment_type, guests, last_status, request_payload,
                   failure_reason
            FROM orders WHERE upstream_order_id = ?
            "#,
        )
        .bind(upstream_order_id)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;

        row.map(OrderRecord::try_from).transpose()
    }

    pub async fn advance(
        &self,
        partner_order_id: &str,
        new_state: OrderState,
        update: OrderUpdate<'_>,
    ) -> Result<()> {
        let guests_payload = update
            .guests
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE orders
            SET state = ?,
                upstream_order_id = COALESCE(?, upstream_order_id),
                upstream_item_id = COALESCE(?, upstream_item_id),
                booking_hash = COALESCE(?, booking_hash),
                payment_type = COALESCE(?, payment_type),
                guests = COALESCE(?, guests),
                last_status = COALESCE(?, last_status),
                failure_reason = COALESCE(?, failure_reason),
                updated_at = ?
            WHERE partner_order_id = ?
            "#,
        )
        .bind(new_state.as_str())
        .bind(update.upstream_order_id)
        .bind(update.upstream_item_id)
        .bind(update.booking_hash)
        .bind(update.payment_type)
        .bind(guests_payload)
        .bind(update.last_status)
        .bind(update.failure_reason)
        .bind(Utc::now().to_rfc3339())
        .bind(partner_order_id)
        .execute(self.pool.inner())
        .await
        .map_err(|e| DatabaseError::QueryExecution(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::setup;

    #[tokio::test]
    async fn insert_then_advance_round_trips() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = OrderStore::new(pool);

        store
            .insert_new("po-1", "hash-abc", &serde_json::json!({"guests": []}))
            .await
            .unwrap();

        let record = store.get("po-1").await.unwrap().unwrap();
        assert_eq!(record.state, OrderState::New);
        assert!(record.upstream_order_id.is_none());

        store
            .advance(
                "po-1",
                OrderState::Processing,
                OrderUpdate {
                    upstream_order_id: Some(42),
                    upstream_item_id: Some(7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = store.get("po-1").await.unwrap().unwrap();
        assert_eq!(record.state, OrderState::Processing);
        assert_eq!(record.upstream_order_id, Some(42));

        let by_upstream = store.find_by_upstream_order_id(42).await.unwrap().unwrap();
        assert_eq!(by_upstream.partner_order_id, "po-1");
    }

    #[tokio::test]
    async fn advance_persists_booking_hash_payment_type_and_guests() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = OrderStore::new(pool);
        store.insert_new("po-2", "hash-xyz", &serde_json::json!({})).await.unwrap();

        store
            .advance(
                "po-2",
                OrderState::Priced,
                OrderUpdate { booking_hash: Some("bhash-1"), ..Default::default() },
            )
            .await
            .unwrap();
        let record = store.get("po-2").await.unwrap().unwrap();
        assert_eq!(record.booking_hash.as_deref(), Some("bhash-1"));

        let guests = serde_json::json!([{"first_name": "Ada", "last_name": "Lovelace"}]);
        store
            .advance(
                "po-2",
                OrderState::Processing,
                OrderUpdate { payment_type: Some("now"), guests: Some(&guests), ..Default::default() },
            )
            .await
            .unwrap();
        let record = store.get("po-2").await.unwrap().unwrap();
        assert_eq!(record.payment_type.as_deref(), Some("now"));
        assert_eq!(record.guests, Some(guests));
        // booking_hash set in the first transition must survive the second.
        assert_eq!(record.booking_hash.as_deref(), Some("bhash-1"));
    }

    #[tokio::test]
    async fn unknown_order_is_none() {
        let pool = setup("sqlite::memory:").await.unwrap();
        let store = OrderStore::new(pool);
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
