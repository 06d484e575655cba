//! Route handlers. Each extracts its request body, derives the
//! per-request deadline from the configured budget, dispatches to the
//! relevant subsystem, and renders an [`Envelope`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::RequestId;
use crate::api::responses::{Envelope, ErrorResponse, ResponseMeta};
use crate::api::AppState;
use crate::booking::GuestInfo;
use crate::deadline::Deadline;
use crate::error::{GatewayError, Result};
use crate::search::SearchParams;
use crate::upstream::types::RoomGuests;

/// Computes the absolute cutoff for this inbound request, once, so every
/// downstream hop (resolve, search, the upstream call and its retries)
/// draws from the same shared budget instead of each restarting its own.
fn deadline(state: &AppState) -> Deadline {
    Deadline::after(state.config.request_deadline)
}

fn meta(request_id: &RequestId, started_at: chrono::DateTime<Utc>) -> ResponseMeta {
    ResponseMeta::new(request_id.0.clone(), started_at)
}

// -- /search ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub destination: String,
    pub checkin: String,
    pub checkout: String,
    #[serde(default)]
    pub adults: Option<u32>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub residency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseBody {
    pub region_id: i64,
    pub hotels: Vec<crate::search::EnrichedHotel>,
}

pub async fn search_post(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(params): Json<SearchParams>,
) -> std::result::Result<Envelope<SearchResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    run_search(&state, &request_id.0, started_at, params).await
}

/// `GET /search` accepts the same parameters flattened into query string,
/// for callers that can't send a JSON body.
pub async fn search_get(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Query(q): Query<SearchQuery>,
) -> std::result::Result<Envelope<SearchResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let params = SearchParams {
        destination: q.destination,
        checkin: q.checkin,
        checkout: q.checkout,
        guests: vec![RoomGuests {
            adults: q.adults.unwrap_or(2),
            children: vec![],
        }],
        currency: q.currency.unwrap_or_else(|| "USD".to_string()),
        residency: q.residency.unwrap_or_else(|| "us".to_string()),
    };
    run_search(&state, &request_id.0, started_at, params).await
}

async fn run_search(
    state: &AppState,
    request_id: &RequestId,
    started_at: chrono::DateTime<Utc>,
    params: SearchParams,
) -> std::result::Result<Envelope<SearchResponseBody>, ErrorResponse> {
    let result = state
        .search
        .search(&params, deadline(state))
        .await
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.clone(), started_at })?;

    let mut response_meta = meta(request_id, started_at);
    if let Some(age) = result.cache_age_secs {
        response_meta = response_meta.from_cache(age);
    }
    Ok(Envelope::ok(
        SearchResponseBody { region_id: result.region_id, hotels: result.hotels },
        response_meta,
    ))
}

// -- /hotel/details ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HotelDetailsRequest {
    pub hotel_id: i64,
    pub checkin: String,
    pub checkout: String,
    pub guests: Vec<RoomGuests>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_residency")]
    pub residency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_residency() -> String {
    "us".to_string()
}

#[derive(Debug, Serialize)]
pub struct HotelDetailsResponse {
    pub hotel_id: i64,
    pub rates: Vec<crate::upstream::types::Rate>,
    #[serde(rename = "static")]
    pub static_attributes: Option<crate::upstream::types::HotelStatic>,
}

pub async fn hotel_details(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<HotelDetailsRequest>,
) -> std::result::Result<Envelope<HotelDetailsResponse>, ErrorResponse> {
    let started_at = Utc::now();
    let outcome: Result<HotelDetailsResponse> = async {
        let residency = crate::search::normalize_residency(&req.residency);
        let response = state
            .upstream
            .hotel_page(
                req.hotel_id,
                &req.checkin,
                &req.checkout,
                &req.guests,
                &req.currency,
                &residency,
                deadline(&state).remaining(),
            )
            .await?;

        let hotel = response
            .hotels
            .into_iter()
            .find(|h| h.hotel_id == req.hotel_id)
            .ok_or_else(|| GatewayError::not_found(format!("no rates for hotel {}", req.hotel_id)))?;

        let static_attributes = match state.catalogue.lookup_hotels(&[req.hotel_id]).await {
            Ok(mut map) => map.remove(&req.hotel_id),
            Err(e) => {
                tracing::warn!(error = %e, "catalogue enrichment failed for hotel details");
                None
            }
        };

        Ok(HotelDetailsResponse { hotel_id: hotel.hotel_id, rates: hotel.rates, static_attributes })
    }
    .await;

    outcome
        .map(|body| Envelope::ok(body, meta(&request_id.0, started_at)))
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /hotel/static-info ------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StaticInfoRequest {
    pub hotel_id: i64,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

pub async fn hotel_static_info_post(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<StaticInfoRequest>,
) -> std::result::Result<Envelope<crate::upstream::types::HotelStatic>, ErrorResponse> {
    let started_at = Utc::now();
    resolve_static_info(&state, &request_id.0, started_at, req.hotel_id, &req.language).await
}

pub async fn hotel_static_info_get(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Path(hid): Path<i64>,
) -> std::result::Result<Envelope<crate::upstream::types::HotelStatic>, ErrorResponse> {
    let started_at = Utc::now();
    resolve_static_info(&state, &request_id.0, started_at, hid, "en").await
}

async fn resolve_static_info(
    state: &AppState,
    request_id: &RequestId,
    started_at: chrono::DateTime<Utc>,
    hotel_id: i64,
    language: &str,
) -> std::result::Result<Envelope<crate::upstream::types::HotelStatic>, ErrorResponse> {
    let outcome: Result<(crate::upstream::types::HotelStatic, Option<i64>)> = async {
        if let Some((cached, age)) = state
            .cache
            .get_hotel_static(hotel_id)
            .await
            .map(|v| v.map(|h| (h, None)))?
        {
            return Ok((cached, age));
        }

        let hotel = state.upstream.hotel_info(hotel_id, language, deadline(state).remaining()).await?;
        if let Err(e) = state.cache.put_hotel_static(&hotel).await {
            tracing::warn!(error = %e, "hotel_static_cache write failed");
        }
        Ok((hotel, None))
    }
    .await;

    match outcome {
        Ok((hotel, age)) => {
            let mut response_meta = meta(request_id, started_at);
            if let Some(age) = age {
                response_meta = response_meta.from_cache(age);
            }
            Ok(Envelope::ok(hotel, response_meta))
        }
        Err(error) => Err(ErrorResponse { error, request_id: request_id.0.clone(), started_at }),
    }
}

// -- /filter-values -----------------------------------------------------------

pub async fn filter_values(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
) -> std::result::Result<Envelope<serde_json::Value>, ErrorResponse> {
    let started_at = Utc::now();
    let outcome: Result<(serde_json::Value, Option<i64>)> = async {
        if let Some(cached) = state.cache.get_filter_values().await? {
            return Ok((cached, Some(0)));
        }
        let response = state.upstream.filter_values(deadline(&state).remaining()).await?;
        let value = serde_json::Value::Object(response.values);
        if let Err(e) = state.cache.put_filter_values(&value).await {
            tracing::warn!(error = %e, "filter_values_cache write failed");
        }
        Ok((value, None))
    }
    .await;

    match outcome {
        Ok((value, age)) => {
            let mut response_meta = meta(&request_id.0, started_at);
            if let Some(age) = age {
                response_meta = response_meta.from_cache(age);
            }
            Ok(Envelope::ok(value, response_meta))
        }
        Err(error) => Err(ErrorResponse { error, request_id: request_id.0.0.clone(), started_at }),
    }
}

// -- /prebook -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PrebookRequest {
    pub book_hash: String,
    #[serde(default = "default_residency")]
    pub residency: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct PrebookResponseBody {
    pub partner_order_id: String,
    pub price_changed: bool,
}

pub async fn prebook(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<PrebookRequest>,
) -> std::result::Result<Envelope<PrebookResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let result = state
        .booking
        .prebook(&req.book_hash, &req.residency, &req.language, deadline(&state))
        .await;

    result
        .map(|(partner_order_id, price_changed)| {
            Envelope::ok(PrebookResponseBody { partner_order_id, price_changed }, meta(&request_id.0, started_at))
        })
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /order/form ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrderFormRequest {
    pub partner_order_id: String,
    pub book_hash: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct OrderFormResponseBody {
    pub order_id: i64,
    pub item_id: i64,
    pub payment_types: Vec<String>,
}

pub async fn order_form(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<OrderFormRequest>,
) -> std::result::Result<Envelope<OrderFormResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let result = state
        .booking
        .form(&req.partner_order_id, &req.book_hash, &req.language, deadline(&state))
        .await;

    result
        .map(|(order_id, item_id, payment_types)| {
            Envelope::ok(OrderFormResponseBody { order_id, item_id, payment_types }, meta(&request_id.0, started_at))
        })
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /order/finish ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrderFinishRequest {
    pub partner_order_id: String,
    pub guests: Vec<GuestInfo>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub available_payment_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderFinishResponseBody {
    pub partner_order_id: String,
    pub state: &'static str,
}

pub async fn order_finish(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<OrderFinishRequest>,
) -> std::result::Result<Envelope<OrderFinishResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let outcome: Result<()> = async {
        let payment_type = match req.payment_type {
            Some(p) => p,
            None => crate::booking::BookingMachine::preferred_payment_type(&req.available_payment_types)
                .ok_or_else(|| GatewayError::invalid_input("no payment_type given or derivable"))?,
        };
        state
            .booking
            .finish(&req.partner_order_id, &req.guests, &payment_type, deadline(&state))
            .await
    }
    .await;

    outcome
        .map(|_| {
            Envelope::ok(
                OrderFinishResponseBody { partner_order_id: req.partner_order_id.clone(), state: "processing" },
                meta(&request_id.0, started_at),
            )
        })
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /order/status ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub partner_order_id: String,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponseBody {
    pub partner_order_id: String,
    pub state: &'static str,
}

pub async fn order_status(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<OrderStatusRequest>,
) -> std::result::Result<Envelope<OrderStatusResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let result = state.booking.poll_until_terminal(&req.partner_order_id).await;

    result
        .map(|final_state| {
            Envelope::ok(
                OrderStatusResponseBody {
                    partner_order_id: req.partner_order_id.clone(),
                    state: final_state.as_str(),
                },
                meta(&request_id.0, started_at),
            )
        })
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /order/cancel ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrderCancelRequest {
    pub partner_order_id: String,
}

#[derive(Debug, Serialize)]
pub struct OrderCancelResponseBody {
    pub partner_order_id: String,
    pub state: &'static str,
}

pub async fn order_cancel(
    State(state): State<Arc<AppState>>,
    request_id: axum::extract::Extension<RequestId>,
    Json(req): Json<OrderCancelRequest>,
) -> std::result::Result<Envelope<OrderCancelResponseBody>, ErrorResponse> {
    let started_at = Utc::now();
    let result = state.booking.cancel(&req.partner_order_id, deadline(&state)).await;

    result
        .map(|_| {
            Envelope::ok(
                OrderCancelResponseBody { partner_order_id: req.partner_order_id.clone(), state: "cancelled" },
                meta(&request_id.0, started_at),
            )
        })
        .map_err(|error| ErrorResponse { error, request_id: request_id.0.0.clone(), started_at })
}

// -- /webhook/booking-status ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub order_id: i64,
    pub status: crate::upstream::types::BookingStatus,
}

/// Always answers HTTP 200: the upstream only cares that delivery
/// succeeded, not whether we were able to act on it.
pub async fn webhook_booking_status(State(state): State<Arc<AppState>>, Json(payload): Json<WebhookPayload>) -> Json<serde_json::Value> {
    if let Err(e) = state.booking.apply_webhook_status(payload.order_id, payload.status).await {
        tracing::warn!(error = %e, order_id = payload.order_id, "failed to apply webhook status");
    }
    Json(serde_json::json!({"status": "ok"}))
}

// -- /health --------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}
