//! HTTP surface: the axum router, shared application state, and the
//! server builder used from `main`.

pub mod handlers;
pub mod middleware;
pub mod responses;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::booking::BookingMachine;
use crate::config::Config;
use crate::database::cache_store::CacheStore;
use crate::database::catalogue::CatalogueStore;
use crate::governor::Governor;
use crate::search::SearchOrchestrator;
use crate::upstream::UpstreamClient;

pub const API_VERSION: &str = "v1";

/// Everything a handler needs, shared read-only behind one `Arc`.
pub struct AppState {
    pub config: Arc<Config>,
    pub search: SearchOrchestrator,
    pub booking: BookingMachine,
    pub cache: CacheStore,
    pub catalogue: CatalogueStore,
    pub upstream: UpstreamClient,
    pub governor: Arc<Governor>,
}

/// Assemble the full route table, layering in request-id tagging, access
/// logging, and CORS ahead of every handler.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", get(handlers::search_get).post(handlers::search_post))
        .route("/hotel/details", post(handlers::hotel_details))
        .route(
            "/hotel/static-info",
            post(handlers::hotel_static_info_post),
        )
        .route(
            "/hotel/static-info/:hid",
            get(handlers::hotel_static_info_get),
        )
        .route("/filter-values", get(handlers::filter_values))
        .route("/prebook", post(handlers::prebook))
        .route("/order/form", post(handlers::order_form))
        .route("/order/finish", post(handlers::order_finish))
        .route("/order/status", post(handlers::order_status))
        .route("/order/cancel", post(handlers::order_cancel))
        .route(
            "/webhook/booking-status",
            post(handlers::webhook_booking_status),
        )
        .route("/health", get(handlers::health))
        .layer(axum::middleware::from_fn(middleware::request_logging_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer())
        .with_state(state)
}

/// Builds and serves the router using a fluent setup pattern; there is no
/// auth or per-client rate-limit configuration here since neither is in
/// scope for this gateway.
pub struct ApiServerBuilder {
    app_state: Option<Arc<AppState>>,
    port: u16,
    host: String,
}

impl ApiServerBuilder {
    pub fn new() -> Self {
        Self {
            app_state: None,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }

    pub fn with_state(mut self, state: Arc<AppState>) -> Self {
        self.app_state = Some(state);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn build_router(self) -> Router {
        let app_state = self.app_state.expect("application state is required");
        create_app_router(app_state)
    }

    pub async fn serve(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("gateway {} listening on http://{}", API_VERSION, addr);
        axum::serve(listener, router).await
    }
}

impl Default for ApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_port_3000_and_all_interfaces() {
        let builder = ApiServerBuilder::new();
        assert_eq!(builder.port, 3000);
        assert_eq!(builder.host, "0.0.0.0");
    }

    #[test]
    fn builder_is_fluent() {
        let builder = ApiServerBuilder::new().port(8080).host("127.0.0.1".to_string());
        assert_eq!(builder.port, 8080);
        assert_eq!(builder.host, "127.0.0.1");
    }
}
