//! End-to-end smoke test for the HTTP surface, exercised without a real
//! upstream: `/health` never touches `AppState.upstream`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use voyagegate::api::{create_app_router, AppState};
use voyagegate::booking::BookingMachine;
use voyagegate::config::Config;
use voyagegate::database::cache_store::CacheStore;
use voyagegate::database::catalogue::CatalogueStore;
use voyagegate::database::orders::OrderStore;
use voyagegate::database::setup;
use voyagegate::governor::Governor;
use voyagegate::resolver::Resolver;
use voyagegate::search::SearchOrchestrator;
use voyagegate::upstream::{UpstreamClient, UpstreamConfig};

fn test_config() -> Config {
    Config {
        upstream_base_url: "http://upstream.invalid".to_string(),
        upstream_content_base_url: "http://upstream.invalid".to_string(),
        upstream_partner_id: "test-partner".to_string(),
        upstream_api_key: "test-key".to_string(),
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        mapbox_token: None,
        request_deadline: Duration::from_secs(5),
        governor_sweep_interval: Duration::from_secs(300),
        cache_sweep_interval: Duration::from_secs(300),
    }
}

async fn test_state() -> Arc<AppState> {
    let config = Arc::new(test_config());
    let pool = setup(&config.database_url).await.unwrap();
    let governor = Arc::new(Governor::new());
    let upstream = UpstreamClient::new(UpstreamConfig::from(config.as_ref()), governor.clone());

    let resolver = Resolver::new(CacheStore::new(pool.clone()), upstream.clone());
    let search = SearchOrchestrator::new(
        CacheStore::new(pool.clone()),
        CatalogueStore::new(pool.clone()),
        resolver,
        upstream.clone(),
    );
    let booking = BookingMachine::new(OrderStore::new(pool.clone()), upstream.clone());

    Arc::new(AppState {
        config,
        search,
        booking,
        cache: CacheStore::new(pool.clone()),
        catalogue: CatalogueStore::new(pool.clone()),
        upstream,
        governor,
    })
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let router = create_app_router(test_state().await);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_order_status_returns_not_found() {
    let router = create_app_router(test_state().await);

    let body = serde_json::json!({ "partner_order_id": "missing-order" }).to_string();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/order/status")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
