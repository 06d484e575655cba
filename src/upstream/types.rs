//! Wire types shared by every upstream operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The upstream's invariant response envelope.
#[derive(Debug, Deserialize)]
pub struct UpstreamEnvelope<T> {
    pub status: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub debug: Option<Value>,
}

impl<T> UpstreamEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// One room's worth of guests, in the typed shape every internal layer uses
/// Dynamic-typed inbound JSON is rejected at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomGuests {
    pub adults: u32,
    #[serde(default)]
    pub children: Vec<u32>,
}

/// A single rate line as returned by a search or hotel-page call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rate {
    pub book_hash: String,
    #[serde(default)]
    pub match_hash: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A hotel as it appears in a live search response, before enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHotel {
    pub hotel_id: i64,
    #[serde(default)]
    pub rates: Vec<Rate>,
}

/// Response of `region_search` / `hotel_ids_search` / `hotel_page`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hotels: Vec<SearchHotel>,
}

/// Static hotel attributes returned by `hotel_info`, and stored verbatim in
/// `hotel_static_cache` / `hotel_catalogue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelStatic {
    pub hotel_id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub star_rating: Option<f32>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub check_out_time: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub raw_data: Option<Value>,
}

/// Result of `region_lookup`, used by the destination resolver's tier 3.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionCandidate {
    pub region_id: i64,
    pub name: String,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionLookupResponse {
    #[serde(default)]
    pub regions: Vec<RegionCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrebookResponse {
    pub booking_hash: String,
    #[serde(default)]
    pub price_changed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentTypeOption {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingFormResponse {
    pub order_id: i64,
    pub item_id: i64,
    #[serde(default)]
    pub payment_types: Vec<PaymentTypeOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingFinishResponse {
    #[serde(default)]
    pub order_id: Option<i64>,
}

/// Status reported by `booking_status` / the inbound webhook. `confirmed` and
/// `failed` are terminal; anything else is treated as still-processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Processing,
    Confirmed,
    Failed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingStatusResponse {
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterValuesResponse {
    #[serde(flatten)]
    pub values: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutocompleteResponse {
    #[serde(default)]
    pub results: Vec<Value>,
}
