//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error body returned for every rejection
///
/// Carries only the machine-readable kind and a caller-facing message; store
/// and key material never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `rate_limited`
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Seconds until the caller may retry (rate limited only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Rate limiter state reported by the health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitHealth {
    pub enabled: bool,
    pub backend: String,
    /// The store is failing and the failure policy is in effect
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outage_since: Option<DateTime<Utc>>,
    pub degraded_admissions: u64,
    pub unavailable_denials: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub rate_limit: RateLimitHealth,
}

/// The verified caller, as seen by handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub subject: String,
    pub tenant: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}
