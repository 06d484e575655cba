//! Destination Resolver: maps a free-form destination string, a
//! `country/city_name_snake_case` slug, or a raw integer to `(region_id,
//! region_name)`.
//!
//! Resolution tries, in order: numeric passthrough, the compiled-in static
//! map, the bulk-dump region catalogue, the write-through destination
//! cache, and finally a live upstream lookup. Each tier is tried only if
//! every earlier one misses.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::database::cache_store::CacheStore;
use crate::database::catalogue::CatalogueStore;
use crate::deadline::Deadline;
use crate::error::{GatewayError, Result};
use crate::upstream::UpstreamClient;

/// Where a resolution came from — surfaced so callers and tests can check
/// tier ordering: a resolution only ever moves to a more authoritative source, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Numeric,
    Static,
    Catalogue,
    Cache,
    Upstream,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub region_id: i64,
    pub region_name: String,
    pub source: Source,
}

/// Compiled-in table of common destinations, including a couple of
/// historically conflated US cities: Los Angeles and Las Vegas are pinned
/// here as the authoritative override regardless of what the upstream's
/// own search might suggest.
static STATIC_MAP: Lazy<HashMap<&'static str, (i64, &'static str)>> = Lazy::new(|| {
    HashMap::from([
        ("new york", (2621, "New York")),
        ("nyc", (2621, "New York")),
        ("new york city", (2621, "New York")),
        ("los angeles", (1555, "Los Angeles")),
        ("la", (1555, "Los Angeles")),
        ("las vegas", (2007, "Las Vegas")),
        ("vegas", (2007, "Las Vegas")),
        ("chicago", (1819, "Chicago")),
        ("miami", (2356, "Miami")),
        ("san francisco", (2801, "San Francisco")),
        ("sf", (2801, "San Francisco")),
        ("boston", (1544, "Boston")),
        ("seattle", (2933, "Seattle")),
        ("washington", (3015, "Washington, D.C.")),
        ("washington dc", (3015, "Washington, D.C.")),
        ("dc", (3015, "Washington, D.C.")),
        ("orlando", (2577, "Orlando")),
        ("san diego", (2798, "San Diego")),
        ("austin", (1432, "Austin")),
        ("dallas", (1907, "Dallas")),
        ("houston", (2011, "Houston")),
        ("phoenix", (2613, "Phoenix")),
        ("denver", (1934, "Denver")),
        ("atlanta", (1401, "Atlanta")),
        ("philadelphia", (2601, "Philadelphia")),
        ("new orleans", (2519, "New Orleans")),
        ("nashville", (2478, "Nashville")),
        ("honolulu", (1988, "Honolulu")),
        ("london", (4001, "London")),
        ("paris", (4102, "Paris")),
        ("rome", (4205, "Rome")),
        ("madrid", (4307, "Madrid")),
        ("barcelona", (4308, "Barcelona")),
        ("berlin", (4406, "Berlin")),
        ("amsterdam", (4502, "Amsterdam")),
        ("dublin", (4601, "Dublin")),
        ("lisbon", (4703, "Lisbon")),
        ("vienna", (4805, "Vienna")),
        ("prague", (4902, "Prague")),
        ("athens", (5001, "Athens")),
        ("istanbul", (5103, "Istanbul")),
        ("dubai", (5207, "Dubai")),
        ("singapore", (5301, "Singapore")),
        ("bangkok", (5402, "Bangkok")),
        ("tokyo", (5501, "Tokyo")),
        ("seoul", (5603, "Seoul")),
        ("hong kong", (5701, "Hong Kong")),
        ("sydney", (5801, "Sydney")),
        ("melbourne", (5802, "Melbourne")),
        ("toronto", (5901, "Toronto")),
        ("vancouver", (5902, "Vancouver")),
        ("mexico city", (6001, "Mexico City")),
        ("cancun", (6003, "Cancun")),
        ("rio de janeiro", (6101, "Rio de Janeiro")),
        ("buenos aires", (6201, "Buenos Aires")),
    ])
});

fn normalize(input: &str) -> String {
    let without_suffix = input.split(',').next().unwrap_or(input);
    let mut out = String::with_capacity(without_suffix.len());
    let mut last_was_space = false;
    for ch in without_suffix.chars() {
        if ch.is_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

/// `country/city_name_snake_case` → title-cased city name.
fn parse_slug(input: &str) -> Option<String> {
    let segment = input.rsplit('/').next()?;
    if segment == input {
        return None;
    }
    Some(
        segment
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn lookup_static(normalized: &str) -> Option<(i64, &'static str)> {
    if let Some(hit) = STATIC_MAP.get(normalized) {
        return Some(*hit);
    }
    STATIC_MAP
        .iter()
        .find(|(key, _)| key.contains(normalized) || normalized.contains(*key))
        .map(|(_, v)| *v)
}

pub struct Resolver {
    cache: CacheStore,
    catalogue: CatalogueStore,
    upstream: UpstreamClient,
}

impl Resolver {
    pub fn new(cache: CacheStore, catalogue: CatalogueStore, upstream: UpstreamClient) -> Self {
        Self { cache, catalogue, upstream }
    }

    pub async fn resolve(&self, input: &str, deadline: Deadline) -> Result<Resolution> {
        if let Ok(region_id) = input.trim().parse::<i64>() {
            return Ok(Resolution {
                region_id,
                region_name: input.to_string(),
                source: Source::Numeric,
            });
        }

        let city_candidate = parse_slug(input).unwrap_or_else(|| input.to_string());
        let normalized = normalize(&city_candidate);

        if let Some((region_id, region_name)) = lookup_static(&normalized) {
            return Ok(Resolution {
                region_id,
                region_name: region_name.to_string(),
                source: Source::Static,
            });
        }

        // The bulk-dump region index: broader coverage than the compiled-in
        // map, still a local lookup with no upstream round trip.
        match self.catalogue.lookup_region_by_name(&normalized).await {
            Ok(Some((region_id, region_name))) => {
                return Ok(Resolution { region_id, region_name, source: Source::Catalogue });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "region_catalogue lookup failed, falling through"),
        }

        if let Some(entry) = self.cache.get_destination(&normalized).await? {
            let _ = self.cache.touch_destination(&normalized).await;
            return Ok(Resolution {
                region_id: entry.region_id,
                region_name: entry.region_name.unwrap_or_else(|| normalized.clone()),
                source: Source::Cache,
            });
        }

        let response = self
            .upstream
            .region_lookup(&city_candidate, deadline.remaining())
            .await?;
        let winner = response
            .regions
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(format!("no destination matched '{input}'")))?;

        if let Err(e) = self
            .cache
            .put_destination(&normalized, winner.region_id, Some(&winner.name))
            .await
        {
            tracing::warn!(error = %e, "write-through to destination_cache failed");
        }

        Ok(Resolution {
            region_id: winner.region_id,
            region_name: winner.name,
            source: Source::Upstream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_input_needs_no_io() {
        assert_eq!(normalize("Los Angeles, California"), "los angeles");
    }

    #[test]
    fn slug_parses_last_segment_title_case() {
        assert_eq!(
            parse_slug("us/new_york_city").as_deref(),
            Some("New York City")
        );
        assert_eq!(parse_slug("no slash here"), None);
    }

    #[test]
    fn static_map_resolves_la_and_vegas_per_the_pinned_override() {
        assert_eq!(lookup_static("los angeles").map(|(id, _)| id), Some(1555));
        assert_eq!(lookup_static("las vegas").map(|(id, _)| id), Some(2007));
        assert_eq!(lookup_static("la").map(|(id, _)| id), Some(1555));
    }

    #[test]
    fn containment_match_is_accepted_in_either_direction() {
        assert_eq!(lookup_static("nyc").map(|(id, _)| id), Some(2621));
    }
}
