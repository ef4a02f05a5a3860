//! Terminal outcomes of request admission

use thiserror::Error;

use crate::domain::auth::AuthError;
use crate::infrastructure::rate_limiter::RateLimitError;

/// Why a request was not admitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionRejection {
    #[error("Authorization bearer token is required")]
    MissingToken,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Tenant is not recognised")]
    UnknownTenant,

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited {
        retry_after: u64,
        limit: u32,
        reset_at: i64,
    },

    #[error("Service temporarily unavailable")]
    StoreUnavailable,
}

impl AdmissionRejection {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionRejection::MissingToken => "missing_token",
            AdmissionRejection::InvalidToken => "invalid_token",
            AdmissionRejection::ExpiredToken => "expired_token",
            AdmissionRejection::RevokedToken => "revoked_token",
            AdmissionRejection::UnknownTenant => "unknown_tenant",
            AdmissionRejection::RateLimited { .. } => "rate_limited",
            AdmissionRejection::StoreUnavailable => "store_unavailable",
        }
    }

    /// HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionRejection::MissingToken
            | AdmissionRejection::InvalidToken
            | AdmissionRejection::ExpiredToken
            | AdmissionRejection::RevokedToken => 401,
            AdmissionRejection::UnknownTenant => 403,
            AdmissionRejection::RateLimited { .. } => 429,
            AdmissionRejection::StoreUnavailable => 503,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AdmissionRejection::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Caused by the caller rather than by infrastructure
    pub fn is_caller_fault(&self) -> bool {
        !matches!(self, AdmissionRejection::StoreUnavailable)
    }
}

impl From<AuthError> for AdmissionRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => AdmissionRejection::MissingToken,
            AuthError::TokenExpired => AdmissionRejection::ExpiredToken,
            AuthError::TokenRevoked => AdmissionRejection::RevokedToken,
            AuthError::UnknownTenant { .. } => AdmissionRejection::UnknownTenant,
            AuthError::RevocationUnavailable { .. } => AdmissionRejection::StoreUnavailable,
            AuthError::InvalidToken
            | AuthError::IssueFailed { .. }
            | AuthError::InvalidSigningKey { .. } => AdmissionRejection::InvalidToken,
        }
    }
}

impl From<RateLimitError> for AdmissionRejection {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::StoreUnavailable(_) => AdmissionRejection::StoreUnavailable,
        }
    }
}
