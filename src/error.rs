//! Gateway-wide error taxonomy.
//!
//! Every subsystem converges on [`GatewayError`] so the public request handler
//! has one place that maps failures to HTTP status codes. Subsystems keep
//! their own narrower error type only where the extra
//! structure earns its keep (see [`crate::upstream::UpstreamError`]); everything
//! else constructs a `GatewayError` directly.

use axum::http::StatusCode;
use thiserror::Error;

/// The eight error kinds the gateway distinguishes, independent of which
/// subsystem raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    InvalidInput,
    NotFound,
    QuotaExhausted,
    SandboxRestriction,
    Timeout,
    UpstreamError,
    BackendUnavailable,
    Internal,
}

impl Kind {
    /// HTTP status this kind is surfaced as.
    pub fn status_code(self) -> StatusCode {
        match self {
            Kind::InvalidInput => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
            Kind::SandboxRestriction => StatusCode::OK,
            Kind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Kind::UpstreamError => StatusCode::BAD_GATEWAY,
            Kind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code included in the error envelope.
    pub fn code(self) -> &'static str {
        match self {
            Kind::InvalidInput => "invalid-input",
            Kind::NotFound => "not-found",
            Kind::QuotaExhausted => "quota-exhausted",
            Kind::SandboxRestriction => "sandbox-restriction",
            Kind::Timeout => "timeout",
            Kind::UpstreamError => "upstream-error",
            Kind::BackendUnavailable => "backend-unavailable",
            Kind::Internal => "internal",
        }
    }
}

/// The gateway's single error type. `kind` drives HTTP status mapping;
/// `message` is the human-readable detail surfaced in the response envelope.
#[derive(Debug, Error)]
#[error("{}: {message}", self.kind.code())]
pub struct GatewayError {
    pub kind: Kind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl GatewayError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(kind: Kind, message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(anyhow::Error::new(source)),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(Kind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Kind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(Kind::BackendUnavailable, message)
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::with_source(Kind::BackendUnavailable, "database operation failed", e)
    }
}

impl From<crate::upstream::UpstreamError> for GatewayError {
    fn from(e: crate::upstream::UpstreamError) -> Self {
        let kind = e.kind;
        GatewayError::with_source(kind, e.to_string(), e)
    }
}

impl From<crate::database::DatabaseError> for GatewayError {
    fn from(e: crate::database::DatabaseError) -> Self {
        GatewayError::with_source(Kind::BackendUnavailable, "database operation failed", e)
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_status_codes_match_taxonomy() {
        assert_eq!(Kind::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Kind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Kind::QuotaExhausted.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Kind::SandboxRestriction.status_code(), StatusCode::OK);
        assert_eq!(Kind::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(Kind::UpstreamError.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(Kind::BackendUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Kind::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
