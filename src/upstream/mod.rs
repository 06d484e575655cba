//! The sole adapter to the upstream HTTP surface.
//!
//! One typed method per upstream operation. Every method funnels through
//! [`UpstreamClient::execute`], which applies the governor, HTTP basic auth,
//! the operation's timeout, envelope parsing, and the retry policy.

pub mod types;

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::Kind;
use crate::governor::Governor;
use std::sync::Arc;

pub use types::*;

/// Narrow error type for the upstream client; converts into [`crate::error::GatewayError`]
/// at the call site via `?` (see `impl From<UpstreamError> for GatewayError`).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: Kind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn timeout(endpoint: &str) -> Self {
        Self::new(Kind::Timeout, format!("upstream call to {endpoint} timed out"))
    }

    fn parse(endpoint: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(
            Kind::UpstreamError,
            format!("failed to parse response from {endpoint}: {detail}"),
        )
    }
}

/// Partner credentials and base URLs for the upstream surface.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub content_base_url: String,
    pub partner_id: String,
    pub api_key: String,
}

impl From<&crate::config::Config> for UpstreamConfig {
    fn from(c: &crate::config::Config) -> Self {
        Self {
            base_url: c.upstream_base_url.clone(),
            content_base_url: c.upstream_content_base_url.clone(),
            partner_id: c.upstream_partner_id.clone(),
            api_key: c.upstream_api_key.clone(),
        }
    }
}

/// Per-operation timeout, shared across every upstream call.
fn timeout_for(endpoint: &str) -> Duration {
    match endpoint {
        e if e.contains("search") => Duration::from_secs(30),
        e if e.contains("hotel/info") || e.contains("hotelpage") => Duration::from_secs(15),
        e if e.contains("prebook") => Duration::from_secs(20),
        e if e.contains("booking") => Duration::from_secs(30),
        _ => Duration::from_secs(15),
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    governor: Arc<Governor>,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig, governor: Arc<Governor>) -> Self {
        register_default_quotas(&governor);
        Self {
            http: reqwest::Client::new(),
            governor,
            config,
        }
    }

    /// Shared request/retry machinery. `idempotent` controls whether a
    /// transient failure is retried.
    async fn execute<T>(
        &self,
        endpoint: &str,
        base_url: &str,
        path: &str,
        body: &serde_json::Value,
        idempotent: bool,
        deadline: Option<Duration>,
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let op_timeout = timeout_for(endpoint);
        let max_attempts = if idempotent { 4 } else { 1 };
        let mut attempt = 0u32;
        let mut backoff = Duration::from_secs(1);
        // Absolute cutoff, computed once: every attempt below — including
        // retries — draws down the SAME budget instead of restarting it.
        let deadline_at = deadline.map(|d| Instant::now() + d);

        loop {
            let remaining = deadline_at.map(|at| at.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(UpstreamError::timeout(endpoint));
            }

            self.governor
                .admit(endpoint, remaining)
                .await
                .map_err(|_| UpstreamError::timeout(endpoint))?;

            let request = self
                .http
                .post(format!("{base_url}{path}"))
                .basic_auth(&self.config.partner_id, Some(&self.config.api_key))
                .timeout(op_timeout)
                .json(body);

            // Re-measure after the admission wait, which can itself consume
            // a meaningful slice of the budget under contention.
            let remaining = deadline_at.map(|at| at.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(UpstreamError::timeout(endpoint));
            }
            let attempt_budget = match remaining {
                Some(r) => r.min(op_timeout),
                None => op_timeout,
            };

            let outcome = tokio::time::timeout(attempt_budget, request.send()).await;

            let response = match outcome {
                Err(_) => return Err(UpstreamError::timeout(endpoint)),
                Ok(Err(e)) => {
                    attempt += 1;
                    let transient = e.is_timeout() || e.is_connect() || e.status().map(|s| s.is_server_error()).unwrap_or(false);
                    if transient && attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    return Err(UpstreamError::new(Kind::UpstreamError, format!("{endpoint}: {e}")));
                }
                Ok(Ok(resp)) => resp,
            };

            if response.status().is_server_error() {
                attempt += 1;
                if attempt < max_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
                return Err(UpstreamError::new(
                    Kind::UpstreamError,
                    format!("{endpoint} returned {}", response.status()),
                ));
            }

            let envelope: UpstreamEnvelope<T> = response
                .json()
                .await
                .map_err(|e| UpstreamError::parse(endpoint, e))?;

            if !envelope.is_ok() {
                let message = envelope.error.unwrap_or_else(|| "unknown upstream error".to_string());
                let kind = classify_envelope_error(&message);
                return Err(UpstreamError::new(kind, message));
            }

            return envelope
                .data
                .ok_or_else(|| UpstreamError::parse(endpoint, "ok envelope without data"));
        }
    }

    pub async fn region_search(
        &self,
        region_id: i64,
        checkin: &str,
        checkout: &str,
        guests: &[RoomGuests],
        currency: &str,
        residency: &str,
        deadline: Option<Duration>,
    ) -> Result<SearchResponse, UpstreamError> {
        let body = json!({
            "region_id": region_id,
            "checkin": checkin,
            "checkout": checkout,
            "guests": guests,
            "currency": currency,
            "residency": residency,
        });
        self.execute::<SearchResponse>(
            "/search/serp/region/",
            &self.config.base_url,
            "/search/serp/region/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn hotel_ids_search(
        &self,
        hotel_ids: &[i64],
        checkin: &str,
        checkout: &str,
        guests: &[RoomGuests],
        currency: &str,
        residency: &str,
        deadline: Option<Duration>,
    ) -> Result<SearchResponse, UpstreamError> {
        let body = json!({
            "ids": hotel_ids,
            "checkin": checkin,
            "checkout": checkout,
            "guests": guests,
            "currency": currency,
            "residency": residency,
        });
        self.execute::<SearchResponse>(
            "/search/serp/hotels/",
            &self.config.base_url,
            "/search/serp/hotels/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn hotel_page(
        &self,
        hotel_id: i64,
        checkin: &str,
        checkout: &str,
        guests: &[RoomGuests],
        currency: &str,
        residency: &str,
        deadline: Option<Duration>,
    ) -> Result<SearchResponse, UpstreamError> {
        let body = json!({
            "id": hotel_id,
            "checkin": checkin,
            "checkout": checkout,
            "guests": guests,
            "currency": currency,
            "residency": residency,
        });
        self.execute::<SearchResponse>(
            "/search/hp/",
            &self.config.base_url,
            "/search/hp/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn hotel_info(
        &self,
        hotel_id: i64,
        language: &str,
        deadline: Option<Duration>,
    ) -> Result<HotelStatic, UpstreamError> {
        let body = json!({ "id": hotel_id, "language": language });
        self.execute::<HotelStatic>(
            "/hotel/info/",
            &self.config.content_base_url,
            "/hotel/info/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn prebook(
        &self,
        book_hash: &str,
        residency: &str,
        language: &str,
        deadline: Option<Duration>,
    ) -> Result<PrebookResponse, UpstreamError> {
        let body = json!({ "book_hash": book_hash, "residency": residency, "language": language });
        self.execute::<PrebookResponse>(
            "/hotel/prebook/",
            &self.config.base_url,
            "/hotel/prebook/",
            &body,
            false,
            deadline,
        )
        .await
    }

    pub async fn booking_form(
        &self,
        book_hash: &str,
        partner_order_id: &str,
        language: &str,
        deadline: Option<Duration>,
    ) -> Result<BookingFormResponse, UpstreamError> {
        let body = json!({
            "book_hash": book_hash,
            "partner_order_id": partner_order_id,
            "language": language,
        });
        self.execute::<BookingFormResponse>(
            "/hotel/order/booking/form/",
            &self.config.base_url,
            "/hotel/order/booking/form/",
            &body,
            false,
            deadline,
        )
        .await
    }

    pub async fn booking_finish(
        &self,
        order_id: i64,
        item_id: i64,
        guests: &[serde_json::Value],
        payment_type: &str,
        partner_order_id: &str,
        deadline: Option<Duration>,
    ) -> Result<BookingFinishResponse, UpstreamError> {
        let body = json!({
            "order_id": order_id,
            "item_id": item_id,
            "guests": guests,
            "payment_type": payment_type,
            "partner_order_id": partner_order_id,
        });
        self.execute::<BookingFinishResponse>(
            "/hotel/order/booking/finish/",
            &self.config.base_url,
            "/hotel/order/booking/finish/",
            &body,
            false,
            deadline,
        )
        .await
    }

    pub async fn booking_status(
        &self,
        order_id: i64,
        deadline: Option<Duration>,
    ) -> Result<BookingStatusResponse, UpstreamError> {
        let body = json!({ "order_id": order_id });
        self.execute::<BookingStatusResponse>(
            "/hotel/order/status/",
            &self.config.base_url,
            "/hotel/order/status/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn order_info(
        &self,
        order_id: i64,
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value, UpstreamError> {
        let body = json!({ "order_id": order_id });
        self.execute::<serde_json::Value>(
            "/hotel/order/info/",
            &self.config.base_url,
            "/hotel/order/info/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn order_cancel(
        &self,
        order_id: i64,
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value, UpstreamError> {
        let body = json!({ "order_id": order_id });
        self.execute::<serde_json::Value>(
            "/hotel/order/cancel/",
            &self.config.base_url,
            "/hotel/order/cancel/",
            &body,
            false,
            deadline,
        )
        .await
    }

    pub async fn multicomplete(
        &self,
        query: &str,
        language: &str,
        deadline: Option<Duration>,
    ) -> Result<AutocompleteResponse, UpstreamError> {
        let body = json!({ "query": query, "language": language });
        self.execute::<AutocompleteResponse>(
            "/search/multicomplete/",
            &self.config.base_url,
            "/search/multicomplete/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn filter_values(&self, deadline: Option<Duration>) -> Result<FilterValuesResponse, UpstreamError> {
        let body = json!({});
        self.execute::<FilterValuesResponse>(
            "/search/filter_values/",
            &self.config.base_url,
            "/search/filter_values/",
            &body,
            true,
            deadline,
        )
        .await
    }

    pub async fn region_lookup(
        &self,
        query: &str,
        deadline: Option<Duration>,
    ) -> Result<RegionLookupResponse, UpstreamError> {
        let body = json!({ "query": query });
        self.execute::<RegionLookupResponse>(
            "/search/multicomplete/region/",
            &self.config.content_base_url,
            "/search/multicomplete/region/",
            &body,
            true,
            deadline,
        )
        .await
    }
}

/// Populate the governor with the upstream's per-operation quotas.
fn register_default_quotas(governor: &Governor) {
    use crate::governor::Quota;
    governor.set_quota("/search/serp/region/", Quota::limited(10, 60));
    governor.set_quota("/search/serp/hotels/", Quota::limited(150, 60));
    governor.set_quota("/search/hp/", Quota::limited(10, 60));
    governor.set_quota("/hotel/info/", Quota::limited(30, 60));
    governor.set_quota("/hotel/prebook/", Quota::limited(30, 60));
    governor.set_quota("/hotel/order/booking/form/", Quota::limited(30, 60));
    governor.set_quota("/hotel/order/booking/finish/", Quota::limited(30, 60));
    governor.set_quota("/hotel/order/status/", Quota::limited(30, 60));
    governor.set_quota("/hotel/order/info/", Quota::limited(30, 60));
    governor.set_quota("/hotel/order/cancel/", Quota::limited(30, 60));
    governor.set_quota("/search/multicomplete/", Quota::limited(30, 60));
    governor.set_quota("/search/filter_values/", Quota::unlimited());
    governor.set_quota("/search/multicomplete/region/", Quota::unlimited());
}

fn classify_envelope_error(message: &str) -> Kind {
    let lower = message.to_lowercase();
    if lower.contains("sandbox") {
        Kind::SandboxRestriction
    } else if lower.contains("quota") || lower.contains("rate limit") || lower.contains("too many") {
        Kind::QuotaExhausted
    } else {
        Kind::UpstreamError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_matches_operation_table() {
        assert_eq!(timeout_for("/search/serp/region/"), Duration::from_secs(30));
        assert_eq!(timeout_for("/hotel/info/"), Duration::from_secs(15));
        assert_eq!(timeout_for("/hotel/prebook/"), Duration::from_secs(20));
        assert_eq!(timeout_for("/hotel/order/booking/finish/"), Duration::from_secs(30));
        assert_eq!(timeout_for("/search/filter_values/"), Duration::from_secs(15));
    }

    #[test]
    fn envelope_error_classification() {
        assert_eq!(classify_envelope_error("sandbox credentials cannot book"), Kind::SandboxRestriction);
        assert_eq!(classify_envelope_error("rate limit exceeded"), Kind::QuotaExhausted);
        assert_eq!(classify_envelope_error("invalid book_hash"), Kind::UpstreamError);
    }
}
