use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::headers::insert_quota_headers;
use crate::rate_limit::AdmissionError;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("no healthy backends available")]
    NoHealthyBackend,

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Admission(AdmissionError::QuotaExceeded {
                class,
                limit,
                reset_at,
            }) => {
                let reset_secs = reset_at.div_ceil(1000);
                debug!(%class, reset_secs, "Rejecting over-quota request");
                let body = Json(json!({
                    "error": "quota_exceeded",
                    "policy": class,
                    "reset_at": reset_secs,
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                insert_quota_headers(response.headers_mut(), limit, 0, reset_secs);
                response
            }
            // caller contract violations, don't leak details
            GatewayError::Admission(err) => {
                error!(error = %err, "Admission check failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error" })),
                )
                    .into_response()
            }
            GatewayError::NoHealthyBackend => {
                warn!("No healthy backend for admitted request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "no_healthy_backend" })),
                )
                    .into_response()
            }
            GatewayError::Upstream(msg) => {
                warn!(error = %msg, "Upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "upstream_error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
    use crate::rate_limit::PolicyClass;

    #[test]
    fn quota_exceeded_is_429_with_headers() {
        let err = GatewayError::from(AdmissionError::QuotaExceeded {
            class: PolicyClass::Transcribe,
            limit: 50,
            reset_at: 1_700_000_000_500,
        });

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING], "0");
        assert_eq!(response.headers()[RATE_LIMIT_RESET], "1700000001");
    }

    #[test]
    fn invalid_key_is_generic_internal_error() {
        let err = GatewayError::from(AdmissionError::InvalidKey("empty".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(RATE_LIMIT_RESET).is_none());
    }

    #[test]
    fn backend_failures_map_to_gateway_statuses() {
        assert_eq!(
            GatewayError::NoHealthyBackend.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Upstream("connection refused".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
