//! Response envelope shared by every route.
//!
//! Every route answers `{success, <payload fields>, meta, error?}`. The payload
//! fields vary by route (`hotels`, `hotel`, `order`, ...) so `Envelope<T>` flattens
//! whatever `T` serializes to directly into the top-level object rather than
//! nesting it under a fixed `data` key.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{GatewayError, Kind};

/// Top-level response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    pub meta: ResponseMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> Envelope<T> {
    /// A successful response carrying `payload`, optionally tagged as a cache hit.
    pub fn ok(payload: T, meta: ResponseMeta) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            meta,
            error: None,
        }
    }
}

impl Envelope<()> {
    /// An error response with no payload.
    pub fn err(error: &GatewayError, meta: ResponseMeta) -> Self {
        let mut meta = meta;
        if error.kind == Kind::SandboxRestriction {
            meta.sandbox_restriction = true;
        }
        Self {
            success: false,
            payload: None,
            meta,
            error: Some(ErrorBody {
                message: error.to_string(),
                code: error.kind.code(),
            }),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Response metadata attached to every envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<i64>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sandbox_restriction: bool,
}

impl ResponseMeta {
    pub fn new(request_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            from_cache: false,
            cache_age: None,
            duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
            timestamp: Utc::now(),
            request_id,
            sandbox_restriction: false,
        }
    }

    pub fn from_cache(mut self, cache_age_secs: i64) -> Self {
        self.from_cache = true;
        self.cache_age = Some(cache_age_secs);
        self
    }
}

/// `error` field of a failed envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
}

/// Turns any `GatewayError` into a fully formed HTTP response, mapping its
/// [`Kind`] to a status code per the error taxonomy.
pub struct ErrorResponse {
    pub error: GatewayError,
    pub request_id: String,
    pub started_at: DateTime<Utc>,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.error.kind.status_code();
        let meta = ResponseMeta::new(self.request_id, self.started_at);
        let body = Envelope::<()>::err(&self.error, meta);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_flattens_payload_fields() {
        #[derive(Serialize)]
        struct Hotels {
            hotels: Vec<u32>,
        }
        let meta = ResponseMeta::new("req-1".into(), Utc::now());
        let env = Envelope::ok(Hotels { hotels: vec![1, 2] }, meta);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["hotels"], json!([1, 2]));
        assert_eq!(v["success"], json!(true));
        assert!(v.get("error").is_none());
    }

    #[test]
    fn error_envelope_carries_sandbox_flag() {
        let err = GatewayError::new(Kind::SandboxRestriction, "blocked".to_string());
        let meta = ResponseMeta::new("req-2".into(), Utc::now());
        let env = Envelope::<()>::err(&err, meta);
        assert!(env.meta.sandbox_restriction);
        assert_eq!(env.error.unwrap().code, "sandbox-restriction");
    }
}
