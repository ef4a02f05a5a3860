//! Built-in gateway handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;

use hearth_core::application::AdmissionRejection;

use crate::presentation::auth::Authenticated;
use crate::presentation::middleware::{AdmissionState, rejection_response};
use crate::presentation::models::{HealthResponse, RateLimitHealth, WhoAmIResponse};

/// GET /health
pub async fn health_check(State(state): State<Arc<AdmissionState>>) -> Json<HealthResponse> {
    let limiter = state.pipeline.limiter();
    let snapshot = limiter.degradation();
    let degraded = snapshot.outage_since.is_some();

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        rate_limit: RateLimitHealth {
            enabled: limiter.is_enabled(),
            backend: limiter.backend().as_str().to_string(),
            degraded,
            outage_since: snapshot.outage_since,
            degraded_admissions: snapshot.degraded_admissions,
            unavailable_denials: snapshot.unavailable_denials,
        },
    })
}

/// GET /api/v1/whoami
pub async fn whoami(Authenticated(identity): Authenticated) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        subject: identity.subject.to_string(),
        tenant: identity.tenant.to_string(),
        role: identity.role.as_str().to_string(),
        expires_at: identity.expires_at,
    })
}

/// POST /api/v1/auth/logout - revoke the presented token
pub async fn logout(
    State(state): State<Arc<AdmissionState>>,
    Authenticated(identity): Authenticated,
) -> Response {
    match state.pipeline.codec().revoke(&identity).await {
        Ok(()) => {
            tracing::info!(subject = %identity.subject, tenant = %identity.tenant, "Token revoked on logout");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::warn!(subject = %identity.subject, error = %e, "Logout could not revoke token");
            rejection_response(&AdmissionRejection::from(e))
        }
    }
}
