//! HTTP middleware: request-id tagging, structured request/response
//! logging, and CORS. The per-request cancellation deadline is computed
//! independently, straight from configuration, at the top of each handler
//! (see `deadline()` in `api::handlers`) rather than attached here.
//!
//! End-user authentication and per-client rate limiting are explicitly out
//! of scope; the governor in [`crate::governor`] already protects the
//! upstream, which is the only quota that matters here.

use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Request ID header name
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Attach a request id, reusing an inbound one if the caller already set it.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// The per-request id, stashed in extensions by [`request_id_middleware`]
/// and read back out by handlers for `meta.request_id`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Logs one `info` line at completion.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    response
}

/// Permissive CORS: this gateway has no cookie-based session to protect.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderValue::from_static("x-request-id"),
        ])
        .expose_headers([HeaderValue::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_constant_is_the_conventional_header_name() {
        assert_eq!(REQUEST_ID_HEADER, "X-Request-ID");
    }
}
