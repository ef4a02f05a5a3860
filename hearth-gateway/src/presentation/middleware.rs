//! HTTP middleware for the gateway

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use hearth_core::application::{AdmissionPipeline, AdmissionRejection, AdmissionRequest};

use crate::presentation::models::ErrorResponse;
use crate::presentation::routes::RouteClassifier;

/// Shared state for the admission middleware and the built-in handlers
#[derive(Clone)]
pub struct AdmissionState {
    pub pipeline: AdmissionPipeline,
    pub classifier: RouteClassifier,
    /// Read the source address from `X-Forwarded-For` / `X-Real-IP`
    pub trust_forwarded_headers: bool,
}

impl AdmissionState {
    pub fn new(
        pipeline: AdmissionPipeline,
        classifier: RouteClassifier,
        trust_forwarded_headers: bool,
    ) -> Self {
        Self {
            pipeline,
            classifier,
            trust_forwarded_headers,
        }
    }
}

impl std::fmt::Debug for AdmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionState")
            .field("rate_limit_enabled", &self.pipeline.limiter().is_enabled())
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish()
    }
}

/// Render a rejection as the JSON error body with its status and headers
pub fn rejection_response(rejection: &AdmissionRejection) -> Response {
    let status =
        StatusCode::from_u16(rejection.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = ErrorResponse {
        error: rejection.kind().to_string(),
        message: rejection.to_string(),
        retry_after: rejection.retry_after(),
    };
    let mut response = (status, Json(body)).into_response();

    match rejection {
        AdmissionRejection::RateLimited {
            retry_after,
            limit,
            reset_at,
        } => {
            add_rate_limit_headers(&mut response, *limit, 0, *reset_at);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        AdmissionRejection::StoreUnavailable => {}
        _ if status == StatusCode::UNAUTHORIZED => {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        _ => {}
    }

    response
}

/// Add IETF draft rate limit headers
///
/// https://datatracker.ietf.org/doc/html/draft-ietf-httpapi-ratelimit-headers
fn add_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_at: i64) {
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_at));
}

/// Source address for the anonymous bucket
pub fn extract_source_addr(request: &Request, trust_forwarded_headers: bool) -> String {
    if trust_forwarded_headers {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                request
                    .headers()
                    .get("x-real-ip")
                    .and_then(|h| h.to_str().ok())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            });
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Admission middleware
///
/// Verifies the bearer token, resolves the tenant and charges the rate limit
/// before the handler runs. On admission the verified `Identity` is inserted
/// into request extensions and `RateLimit-*` headers are added to the response.
pub async fn admission_middleware(
    State(state): State<Arc<AdmissionState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let route = state
        .classifier
        .classify(request.method(), request.uri().path());
    let source_addr = extract_source_addr(&request, state.trust_forwarded_headers);
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .pipeline
        .admit(AdmissionRequest {
            authorization: authorization.as_deref(),
            source_addr: &source_addr,
            route_class: route.class,
            public: route.public,
        })
        .await;

    let admission = match outcome {
        Ok(admission) => admission,
        Err(rejection) => return rejection_response(&rejection),
    };

    if let Some(identity) = admission.identity {
        request.extensions_mut().insert(identity);
    }

    let decision = admission.decision;
    let mut response = next.run(request).await;
    add_rate_limit_headers(
        &mut response,
        decision.limit,
        decision.remaining,
        decision.reset_at,
    );
    response
}

/// Request logging middleware with timing and request ID
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let start_time = Instant::now();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Processing request"
    );

    let mut response = next.run(request).await;
    let duration = start_time.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
