//! Search Orchestrator: signs a search, serves from cache, invokes
//! upstream on a miss, enriches hotels from the catalogue, and writes the
//! cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::database::cache_store::{CacheStore, CachedHotelEntry, SearchCacheEntry};
use crate::database::catalogue::CatalogueStore;
use crate::deadline::Deadline;
use crate::error::{GatewayError, Result};
use crate::resolver::Resolver;
use crate::upstream::types::RoomGuests;
use crate::upstream::UpstreamClient;

/// Inbound search parameters, already validated by the request handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub destination: String,
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

/// Strips everything from the first `-` onward and lowercases, collapsing
/// variants like `en-US` or `EN-GB` down to a plain `en`.
pub fn normalize_residency(residency: &str) -> String {
    residency
        .split('-')
        .next()
        .unwrap_or(residency)
        .to_lowercase()
}

/// One hotel as returned to the caller, rate data plus optional enrichment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedHotel {
    pub hotel_id: i64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub rates: Vec<crate::upstream::types::Rate>,
    #[serde(rename = "static")]
    pub static_attributes: Option<crate::upstream::types::HotelStatic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub region_id: i64,
    pub hotels: Vec<EnrichedHotel>,
    pub from_cache: bool,
    pub cache_age_secs: Option<i64>,
}

/// Deterministic 128-bit digest (truncated SHA-256) over the canonicalized
/// search tuple `(region_id, checkin, checkout, guests, currency)`.
/// Residency is intentionally excluded from the signature.
pub fn compute_signature(region_id: i64, checkin: &str, checkout: &str, guests: &[RoomGuests], currency: &str) -> String {
    let guests_canonical: Vec<(u32, Vec<u32>)> = guests
        .iter()
        .map(|r| (r.adults, r.children.clone()))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(region_id.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(checkin.as_bytes());
    hasher.update(b"|");
    hasher.update(checkout.as_bytes());
    hasher.update(b"|");
    hasher.update(
        serde_json::to_string(&guests_canonical)
            .expect("guests canonical form is always serializable")
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(currency.to_uppercase().as_bytes());

    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

pub struct SearchOrchestrator {
    cache: CacheStore,
    catalogue: CatalogueStore,
    resolver: Resolver,
    upstream: UpstreamClient,
}

impl SearchOrchestrator {
    pub fn new(cache: CacheStore, catalogue: CatalogueStore, resolver: Resolver, upstream: UpstreamClient) -> Self {
        Self {
            cache,
            catalogue,
            resolver,
            upstream,
        }
    }

    pub async fn search(&self, params: &SearchParams, deadline: Deadline) -> Result<SearchResult> {
        if params.guests.is_empty() {
            return Err(GatewayError::invalid_input("search requires at least one room of guests"));
        }
        if params.checkout <= params.checkin {
            return Err(GatewayError::invalid_input("checkout must be after checkin"));
        }

        let resolution = self.resolver.resolve(&params.destination, deadline).await?;
        let currency = if params.currency.is_empty() {
            default_currency()
        } else {
            params.currency.clone()
        };
        let signature = compute_signature(
            resolution.region_id,
            &params.checkin,
            &params.checkout,
            &params.guests,
            &currency,
        );

        if let Some((entry, age_secs)) = self.cache.get_search_with_age(&signature).await? {
            let _ = self.cache.hit_search(&signature).await;
            return Ok(Self::result_from_cache_entry(entry, true, Some(age_secs)));
        }

        let residency = normalize_residency(&params.residency);
        let response = self
            .upstream
            .region_search(
                resolution.region_id,
                &params.checkin,
                &params.checkout,
                &params.guests,
                &currency,
                &residency,
                deadline.remaining(),
            )
            .await?;

        let hotel_ids: Vec<i64> = response.hotels.iter().map(|h| h.hotel_id).collect();

        let static_by_id = match self.catalogue.lookup_hotels(&hotel_ids).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "catalogue enrichment failed, returning hotels unenriched");
                HashMap::new()
            }
        };

        let mut rates_index = HashMap::with_capacity(response.hotels.len());
        for hotel in &response.hotels {
            let prices: Vec<f64> = hotel.rates.iter().map(|r| r.price).collect();
            let min_rate = prices.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_rate = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            rates_index.insert(
                hotel.hotel_id,
                CachedHotelEntry {
                    min_rate: if min_rate.is_finite() { min_rate } else { 0.0 },
                    max_rate: if max_rate.is_finite() { max_rate } else { 0.0 },
                    rates: hotel.rates.clone(),
                    static_attributes: static_by_id.get(&hotel.hotel_id).cloned(),
                },
            );
        }

        let entry = SearchCacheEntry {
            params: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
            region_id: resolution.region_id,
            hotel_ids,
            rates_index,
        };

        if let Err(e) = self.cache.put_search(&signature, &entry).await {
            tracing::warn!(error = %e, "search_cache write failed");
        }

        Ok(Self::result_from_cache_entry(entry, false, None))
    }

    /// Reassemble a page of an already-cached search.
    pub async fn paginate(&self, signature: &str, page: usize, page_size: usize) -> Result<SearchResult> {
        let (entry, age_secs) = self
            .cache
            .get_search_with_age(signature)
            .await?
            .ok_or_else(|| GatewayError::not_found("search signature absent or expired"))?;

        let start = page.saturating_mul(page_size);
        let region_id = entry.region_id;
        let page_ids: Vec<i64> = entry.hotel_ids.iter().skip(start).take(page_size).copied().collect();

        let hotels = page_ids
            .into_iter()
            .filter_map(|id| entry.rates_index.get(&id).map(|r| (id, r.clone())))
            .map(|(hotel_id, r)| EnrichedHotel {
                hotel_id,
                min_rate: r.min_rate,
                max_rate: r.max_rate,
                rates: r.rates,
                static_attributes: r.static_attributes,
            })
            .collect();

        Ok(SearchResult {
            region_id,
            hotels,
            from_cache: true,
            cache_age_secs: Some(age_secs),
        })
    }

    fn result_from_cache_entry(entry: SearchCacheEntry, from_cache: bool, cache_age_secs: Option<i64>) -> SearchResult {
        let hotels = entry
            .hotel_ids
            .iter()
            .filter_map(|id| entry.rates_index.get(id).map(|r| (*id, r.clone())))
            .map(|(hotel_id, r)| EnrichedHotel {
                hotel_id,
                min_rate: r.min_rate,
                max_rate: r.max_rate,
                rates: r.rates,
                static_attributes: r.static_attributes,
            })
            .collect();

        SearchResult {
            region_id: entry.region_id,
            hotels,
            from_cache,
            cache_age_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_ignores_residency() {
        let guests = vec![RoomGuests { adults: 2, children: vec![] }];
        let sig_a = compute_signature(2621, "2025-07-15", "2025-07-17", &guests, "USD");
        let sig_b = compute_signature(2621, "2025-07-15", "2025-07-17", &guests, "USD");
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn signature_changes_with_any_component() {
        let guests = vec![RoomGuests { adults: 2, children: vec![] }];
        let base = compute_signature(2621, "2025-07-15", "2025-07-17", &guests, "USD");
        let different_region = compute_signature(9999, "2025-07-15", "2025-07-17", &guests, "USD");
        assert_ne!(base, different_region);
    }

    #[test]
    fn residency_normalization_strips_from_first_dash() {
        assert_eq!(normalize_residency("en-US"), "en");
        assert_eq!(normalize_residency("us"), "us");
        assert_eq!(normalize_residency("EN-GB"), "en");
    }
}
