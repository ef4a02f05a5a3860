//! Configuration validation module

use std::collections::HashSet;

use crate::config::{
    AuthConfig, LoggingConfig, QuotaConfig, RateLimitConfig, RateLimitStorageBackend,
    RevocationBackend, RouteConfig, ServerConfig, SigningKeyConfig, TenantsConfig,
};

/// Minimum HMAC secret length in bytes
const MIN_HMAC_SECRET_LEN: usize = 32;
/// One year
const MAX_TOKEN_TTL_MINUTES: u64 = 60 * 24 * 365;

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },

    #[error("Authentication configuration error: {message}")]
    Auth { message: String },

    #[error("Rate limit configuration error: {message}")]
    RateLimit { message: String },

    #[error("Tenant configuration error: {message}")]
    Tenants { message: String },

    #[error("Route configuration error: {message}")]
    Routes { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn tenants(message: impl Into<String>) -> Self {
        Self::Tenants {
            message: message.into(),
        }
    }

    pub fn routes(message: impl Into<String>) -> Self {
        Self::Routes {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // u16 cannot exceed 65535, so only 0 is out of range
        if self.port == 0 {
            return Err(ValidationError::server(format!(
                "Port must be in range 1-65535, got {}",
                self.port
            )));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.to_lowercase().as_str() {
            "json" | "pretty" | "text" | "compact" => {}
            other => {
                return Err(ValidationError::logging(format!(
                    "format must be one of json, pretty, compact; got '{}'",
                    other
                )));
            }
        }

        if self.level.trim().is_empty() {
            return Err(ValidationError::logging("level cannot be empty"));
        }

        Ok(())
    }
}

impl Validate for SigningKeyConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.kid.trim().is_empty() {
            return Err(ValidationError::auth("signing key kid cannot be empty"));
        }

        if self.is_symmetric() {
            match &self.secret {
                Some(secret) if secret.len() >= MIN_HMAC_SECRET_LEN => {}
                Some(_) => {
                    return Err(ValidationError::auth(format!(
                        "key '{}': HMAC secret must be at least {} bytes",
                        self.kid, MIN_HMAC_SECRET_LEN
                    )));
                }
                None => {
                    return Err(ValidationError::auth(format!(
                        "key '{}': {:?} requires a secret",
                        self.kid, self.algorithm
                    )));
                }
            }
        } else if self.public_key_pem.is_none() {
            return Err(ValidationError::auth(format!(
                "key '{}': {:?} requires public_key_pem",
                self.kid, self.algorithm
            )));
        }

        Ok(())
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.signing_keys.is_empty() {
            return Err(ValidationError::auth(
                "at least one signing key must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.signing_keys {
            key.validate()?;
            if !seen.insert(key.kid.as_str()) {
                return Err(ValidationError::auth(format!(
                    "duplicate signing key kid '{}'",
                    key.kid
                )));
            }
        }

        if let Some(primary) = &self.primary_key_id
            && !seen.contains(primary.as_str())
        {
            return Err(ValidationError::auth(format!(
                "primary_key_id '{}' is not among the signing keys",
                primary
            )));
        }

        if self.token_ttl_minutes == 0 {
            return Err(ValidationError::auth(
                "token_ttl_minutes must be greater than 0",
            ));
        }

        if self.token_ttl_minutes > MAX_TOKEN_TTL_MINUTES {
            return Err(ValidationError::auth(format!(
                "token_ttl_minutes must be at most {}",
                MAX_TOKEN_TTL_MINUTES
            )));
        }

        if self.revocation.enabled && self.revocation.lookup_timeout_ms == 0 {
            return Err(ValidationError::auth(
                "revocation.lookup_timeout_ms must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn validate_quota(name: &str, quota: &QuotaConfig) -> Result<(), ValidationError> {
    if quota.limit == 0 {
        return Err(ValidationError::rate_limit(format!(
            "quota '{}': limit must be greater than 0",
            name
        )));
    }
    if quota.window_seconds == 0 {
        return Err(ValidationError::rate_limit(format!(
            "quota '{}': window_seconds must be greater than 0",
            name
        )));
    }
    Ok(())
}

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }

        for (tier, classes) in &self.quotas.tiers {
            for (class, quota) in classes {
                validate_quota(&format!("{}/{}", tier, class), quota)?;
            }
        }
        for (class, quota) in &self.quotas.anonymous {
            validate_quota(&format!("anonymous/{}", class), quota)?;
        }
        validate_quota("fallback", &self.quotas.fallback)?;
        validate_quota("anonymous_fallback", &self.quotas.anonymous_fallback)?;

        if self.storage_backend == RateLimitStorageBackend::Redis {
            if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://")
            {
                return Err(ValidationError::rate_limit(format!(
                    "redis.url must start with redis:// or rediss://, got: {}",
                    self.redis.url
                )));
            }
            if self.redis.command_timeout_ms == 0 {
                return Err(ValidationError::rate_limit(
                    "redis.command_timeout_ms must be greater than 0",
                ));
            }
        }

        if self.key_prefix.is_empty() {
            return Err(ValidationError::rate_limit("key_prefix cannot be empty"));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::rate_limit(
                "cleanup_interval_seconds must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for TenantsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for entry in &self.registry {
            if entry.id.trim().is_empty() {
                return Err(ValidationError::tenants("tenant id cannot be empty"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ValidationError::tenants(format!(
                    "duplicate tenant id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

impl Validate for RouteConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        for path in &self.public_paths {
            if !path.starts_with('/') {
                return Err(ValidationError::routes(format!(
                    "public path must start with '/', got '{}'",
                    path
                )));
            }
        }

        for rule in &self.rules {
            if !rule.path_prefix.starts_with('/') {
                return Err(ValidationError::routes(format!(
                    "rule path_prefix must start with '/', got '{}'",
                    rule.path_prefix
                )));
            }
            if rule.route_class.trim().is_empty() {
                return Err(ValidationError::routes(format!(
                    "rule for '{}' has an empty route_class",
                    rule.path_prefix
                )));
            }
        }

        if self.default_read_class.is_empty() || self.default_write_class.is_empty() {
            return Err(ValidationError::routes(
                "default route classes cannot be empty",
            ));
        }

        Ok(())
    }
}

/// Redis-backed revocation needs a reachable Redis URL; checked against the rate limit section
pub fn validate_revocation_backend(
    auth: &AuthConfig,
    rate_limit: &RateLimitConfig,
) -> Result<(), ValidationError> {
    if auth.revocation.enabled
        && auth.revocation.backend == RevocationBackend::Redis
        && rate_limit.redis.url.is_empty()
    {
        return Err(ValidationError::auth(
            "revocation.backend = redis requires rate_limit.redis.url",
        ));
    }
    Ok(())
}
