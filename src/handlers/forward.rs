use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, on};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::headers::insert_decision;
use crate::identity::Identity;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_LATENCY};
use crate::rate_limit::PolicyClass;
use crate::state::AppState;

/// A forwarded route and the policy class that guards it.
#[derive(Debug, Clone, Copy)]
pub struct GuardedRoute {
    pub path: &'static str,
    pub method: MethodFilter,
    pub class: PolicyClass,
}

// Upstream path is the same as the gateway path.
pub const GUARDED_ROUTES: [GuardedRoute; 5] = [
    GuardedRoute {
        path: "/api/generate",
        method: MethodFilter::POST,
        class: PolicyClass::AiEndpoints,
    },
    GuardedRoute {
        path: "/api/chat",
        method: MethodFilter::POST,
        class: PolicyClass::AiEndpoints,
    },
    GuardedRoute {
        path: "/v1/audio/speech",
        method: MethodFilter::POST,
        class: PolicyClass::AiEndpoints,
    },
    GuardedRoute {
        path: "/v1/audio/transcriptions",
        method: MethodFilter::POST,
        class: PolicyClass::Transcribe,
    },
    GuardedRoute {
        path: "/api/tags",
        method: MethodFilter::GET,
        class: PolicyClass::General,
    },
];

pub fn guarded(route: GuardedRoute) -> MethodRouter<Arc<AppState>> {
    on(
        route.method,
        move |State(state): State<Arc<AppState>>,
              identity: Identity,
              method: Method,
              headers: HeaderMap,
              body: Bytes| async move {
            forward_guarded(&state, &identity, route, method, &headers, body).await
        },
    )
}

// Admission first: a denied request never reaches a backend.
async fn forward_guarded(
    state: &AppState,
    identity: &Identity,
    route: GuardedRoute,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    REQUEST_TOTAL.inc();

    let decision = state.guard.admit(&identity.key(), route.class)?;
    debug!(
        %identity,
        class = %route.class,
        remaining = decision.remaining,
        "Request admitted"
    );

    let backend = state
        .load_balancer
        .get_backend()
        .ok_or(GatewayError::NoHealthyBackend)?;

    let mut upstream_headers = HeaderMap::new();
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        upstream_headers.insert(CONTENT_TYPE, content_type.clone());
    }

    let start_time = Instant::now();
    let result = state
        .client
        .request(method, format!("{}{}", backend.url, route.path))
        .headers(upstream_headers)
        .body(body)
        .send()
        .await;

    let upstream = match result {
        Ok(res) => res,
        // transport failure, take the backend out until the next health check
        Err(e) => {
            backend.set_healthy(false);
            warn!(backend = %backend.url, "Backend failed, marked unhealthy");
            return Err(GatewayError::Upstream(e.to_string()));
        }
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    insert_decision(response.headers_mut(), &decision);
    Ok(response)
}
