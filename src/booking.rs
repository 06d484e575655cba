//! Booking State Machine: drives an order through
//! `NEW → PRICED → FORMED → PROCESSING → {CONFIRMED, FAILED}` / `CANCELLED`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::database::orders::{OrderState, OrderStore, OrderUpdate};
use crate::deadline::Deadline;
use crate::error::{GatewayError, Result};
use crate::upstream::types::BookingStatus;
use crate::upstream::UpstreamClient;

/// Lower/upper bound on the poller's interval, and its total budget.
const POLL_INTERVAL_MIN: Duration = Duration::from_secs(2);
const POLL_INTERVAL_MAX: Duration = Duration::from_secs(5);
const POLL_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Preference order used when the caller leaves payment type selection to us.
const PAYMENT_TYPE_PREFERENCE: [&str; 3] = ["now", "hotel", "deposit"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestInfo {
    pub first_name: String,
    pub last_name: String,
}

/// Generates a globally-unique, opaque partner order id: a millisecond
/// timestamp plus a random suffix.
pub fn generate_partner_order_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("po-{millis:x}-{suffix:06x}")
}

pub struct BookingMachine {
    orders: OrderStore,
    upstream: UpstreamClient,
}

impl BookingMachine {
    pub fn new(orders: OrderStore, upstream: UpstreamClient) -> Self {
        Self { orders, upstream }
    }

    /// `NEW → PRICED`. Creates the order row and calls `prebook`.
    pub async fn prebook(
        &self,
        book_hash: &str,
        residency: &str,
        language: &str,
        deadline: Deadline,
    ) -> Result<(String, bool)> {
        let partner_order_id = generate_partner_order_id();
        self.orders
            .insert_new(&partner_order_id, book_hash, &serde_json::json!({}))
            .await?;

        let response = self
            .upstream
            .prebook(book_hash, residency, language, deadline.remaining())
            .await?;

        self.orders
            .advance(
                &partner_order_id,
                OrderState::Priced,
                OrderUpdate { booking_hash: Some(&response.booking_hash), ..Default::default() },
            )
            .await?;

        Ok((partner_order_id, response.price_changed))
    }

    /// `PRICED → FORMED`. Returns the available payment types so the caller
    /// can choose, or this machine's own preference order if asked to pick.
    pub async fn form(
        &self,
        partner_order_id: &str,
        book_hash: &str,
        language: &str,
        deadline: Deadline,
    ) -> Result<(i64, i64, Vec<String>)> {
        self.require_state(partner_order_id, OrderState::Priced).await?;

        let response = self
            .upstream
            .booking_form(book_hash, partner_order_id, language, deadline.remaining())
            .await?;

        let payment_types: Vec<String> = response.payment_types.iter().map(|p| p.type_.clone()).collect();

        self.orders
            .advance(
                partner_order_id,
                OrderState::Formed,
                OrderUpdate {
                    upstream_order_id: Some(response.order_id),
                    upstream_item_id: Some(response.item_id),
                    ..Default::default()
                },
            )
            .await?;

        Ok((response.order_id, response.item_id, payment_types))
    }

    /// Picks a payment type automatically, preferring `now`, then `hotel`,
    /// then `deposit`.
    pub fn preferred_payment_type(available: &[String]) -> Option<String> {
        PAYMENT_TYPE_PREFERENCE
            .iter()
            .find(|pref| available.iter().any(|a| a == *pref))
            .map(|s| s.to_string())
            .or_else(|| available.first().cloned())
    }

    /// `FORMED → PROCESSING`. Idempotent: if `order_id` was already persisted
    /// by a prior attempt, this skips straight to polling without re-issuing
    /// `finish`.
    pub async fn finish(
        &self,
        partner_order_id: &str,
        guests: &[GuestInfo],
        payment_type: &str,
        deadline: Deadline,
    ) -> Result<()> {
        if guests.is_empty() {
            return Err(GatewayError::invalid_input("booking_finish requires at least one guest"));
        }

        let record = self
            .orders
            .get(partner_order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown order {partner_order_id}")))?;

        let guests_value = serde_json::to_value(guests).unwrap_or(serde_json::Value::Null);

        if record.upstream_order_id.is_some() {
            // A previous attempt already persisted an order_id: finish must
            // not be re-issued. Move straight to PROCESSING if not already there.
            if record.state == OrderState::Formed {
                self.orders
                    .advance(
                        partner_order_id,
                        OrderState::Processing,
                        OrderUpdate {
                            payment_type: Some(payment_type),
                            guests: Some(&guests_value),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            return Ok(());
        }

        if record.state != OrderState::Formed {
            return Err(GatewayError::internal(format!(
                "finish called from illegal state {:?}",
                record.state
            )));
        }

        let order_id = record
            .upstream_order_id
            .ok_or_else(|| GatewayError::internal("order_id missing after form"))?;
        let item_id = record
            .upstream_item_id
            .ok_or_else(|| GatewayError::internal("item_id missing after form"))?;

        let guests_json: Vec<serde_json::Value> = guests
            .iter()
            .map(|g| serde_json::to_value(g).unwrap_or(serde_json::Value::Null))
            .collect();

        self.upstream
            .booking_finish(order_id, item_id, &guests_json, payment_type, partner_order_id, deadline.remaining())
            .await?;

        self.orders
            .advance(
                partner_order_id,
                OrderState::Processing,
                OrderUpdate {
                    payment_type: Some(payment_type),
                    guests: Some(&guests_value),
                    ..Default::default()
                },
            )
            .await?;

        Ok(())
    }

    /// `PROCESSING → {CONFIRMED, FAILED}` driven by the webhook. Idempotent
    /// on `(order_id, terminal_status)`: if the order is already terminal,
    /// the duplicate delivery is acknowledged and ignored.
    pub async fn apply_webhook_status(&self, upstream_order_id: i64, status: BookingStatus) -> Result<()> {
        let Some(record) = self.orders.find_by_upstream_order_id(upstream_order_id).await? else {
            tracing::warn!(upstream_order_id, "webhook for unknown order_id, ignoring");
            return Ok(());
        };

        if record.state.is_terminal() {
            return Ok(());
        }

        let new_state = match status {
            BookingStatus::Confirmed => OrderState::Confirmed,
            BookingStatus::Failed => OrderState::Failed,
            BookingStatus::Processing => return Ok(()),
        };

        self.orders
            .advance(
                &record.partner_order_id,
                new_state,
                OrderUpdate { last_status: Some(status_label(&status)), ..Default::default() },
            )
            .await?;
        Ok(())
    }

    /// Polls `booking_status` at an interval in `[2s, 5s]` until a terminal
    /// status is seen or the poll budget is exhausted, in which case the
    /// order is moved to FAILED with `kind=timeout`.
    pub async fn poll_until_terminal(&self, partner_order_id: &str) -> Result<OrderState> {
        let record = self
            .orders
            .get(partner_order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown order {partner_order_id}")))?;
        let order_id = record
            .upstream_order_id
            .ok_or_else(|| GatewayError::internal("order_id missing before polling"))?;

        let outcome = tokio::time::timeout(POLL_BUDGET, self.poll_loop(partner_order_id, order_id)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.orders
                    .advance(
                        partner_order_id,
                        OrderState::Failed,
                        OrderUpdate { failure_reason: Some("poll budget exhausted"), ..Default::default() },
                    )
                    .await?;
                Err(GatewayError::timeout(format!(
                    "order {partner_order_id} did not reach a terminal status within the poll budget"
                )))
            }
        }
    }

    async fn poll_loop(&self, partner_order_id: &str, order_id: i64) -> Result<OrderState> {
        loop {
            if let Some(record) = self.orders.get(partner_order_id).await? {
                if record.state.is_terminal() {
                    return Ok(record.state);
                }
            }

            let response = self.upstream.booking_status(order_id, Some(POLL_INTERVAL_MAX)).await?;
            if response.status.is_terminal() {
                let new_state = match response.status {
                    BookingStatus::Confirmed => OrderState::Confirmed,
                    BookingStatus::Failed => OrderState::Failed,
                    BookingStatus::Processing => unreachable!("is_terminal excludes Processing"),
                };
                self.orders
                    .advance(
                        partner_order_id,
                        new_state,
                        OrderUpdate { last_status: Some(status_label(&response.status)), ..Default::default() },
                    )
                    .await?;
                return Ok(new_state);
            }

            tokio::time::sleep(POLL_INTERVAL_MIN).await;
        }
    }

    /// `{FORMED, PROCESSING, CONFIRMED} → CANCELLED`.
    pub async fn cancel(&self, partner_order_id: &str, deadline: Deadline) -> Result<()> {
        let record = self
            .orders
            .get(partner_order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown order {partner_order_id}")))?;

        if !matches!(record.state, OrderState::Formed | OrderState::Processing | OrderState::Confirmed) {
            return Err(GatewayError::invalid_input(format!(
                "cannot cancel order in state {:?}",
                record.state
            )));
        }

        let order_id = record
            .upstream_order_id
            .ok_or_else(|| GatewayError::internal("order_id missing before cancel"))?;

        self.upstream.order_cancel(order_id, deadline.remaining()).await?;

        self.orders
            .advance(partner_order_id, OrderState::Cancelled, OrderUpdate::default())
            .await?;
        Ok(())
    }

    async fn require_state(&self, partner_order_id: &str, expected: OrderState) -> Result<crate::database::orders::OrderRecord> {
        let record = self
            .orders
            .get(partner_order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown order {partner_order_id}")))?;
        if record.state != expected {
            return Err(GatewayError::internal(format!(
                "expected state {:?}, found {:?}",
                expected, record.state
            )));
        }
        Ok(record)
    }
}

fn status_label(status: &BookingStatus) -> &'static str {
    match status {
        BookingStatus::Processing => "processing",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_order_ids_are_unique_across_many_calls() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_partner_order_id()));
        }
    }

    #[test]
    fn preferred_payment_type_follows_now_hotel_deposit_order() {
        assert_eq!(
            BookingMachine::preferred_payment_type(&["deposit".to_string(), "now".to_string()]),
            Some("now".to_string())
        );
        assert_eq!(
            BookingMachine::preferred_payment_type(&["hotel".to_string(), "deposit".to_string()]),
            Some("hotel".to_string())
        );
        assert_eq!(
            BookingMachine::preferred_payment_type(&["wire".to_string()]),
            Some("wire".to_string())
        );
        assert_eq!(BookingMachine::preferred_payment_type(&[]), None);
    }
}
