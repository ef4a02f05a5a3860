//! Authentication domain errors

use thiserror::Error;

/// Authentication-specific domain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No bearer token provided")]
    MissingToken,

    #[error("Invalid token provided")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    /// The revocation list could not be consulted. Never treated as "not revoked".
    #[error("Revocation lookup failed: {message}")]
    RevocationUnavailable { message: String },

    #[error("Unknown tenant: {tenant}")]
    UnknownTenant { tenant: String },

    #[error("Failed to issue token: {message}")]
    IssueFailed { message: String },

    #[error("Invalid signing key {kid}: {message}")]
    InvalidSigningKey { kid: String, message: String },
}

impl AuthError {
    /// Whether the failure was caused by infrastructure rather than the caller
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::RevocationUnavailable { .. })
    }
}
