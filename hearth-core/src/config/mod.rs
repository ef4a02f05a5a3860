//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub tenants: TenantsConfig,
    pub routes: RouteConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Trust `X-Forwarded-For` / `X-Real-IP` for the anonymous bucket. Enable only behind a proxy.
    pub trust_forwarded_headers: bool,
    /// Grace period for in-flight requests on shutdown (in seconds)
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            trust_forwarded_headers: false,
            shutdown_timeout_seconds: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `json`, `pretty`, `compact`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// A single signing/verification key
///
/// HMAC keys use `secret`. Asymmetric keys use `public_key_pem` for
/// verification and optionally `private_key_pem` when this process also issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyConfig {
    /// Key id, matched against the JWT `kid` header
    pub kid: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default, skip_serializing)]
    pub private_key_pem: Option<String>,
}

fn default_algorithm() -> Algorithm {
    Algorithm::HS256
}

impl SigningKeyConfig {
    /// HMAC key helper
    pub fn hmac(kid: impl Into<String>, algorithm: Algorithm, secret: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            secret: Some(secret.into()),
            public_key_pem: None,
            private_key_pem: None,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        )
    }
}

/// Storage backend for the revocation list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevocationBackend {
    #[default]
    Memory,
    Redis,
}

/// Token revocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    pub enabled: bool,
    pub backend: RevocationBackend,
    /// Upper bound on a single revocation lookup (in milliseconds)
    pub lookup_timeout_ms: u64,
    /// What to do when the revocation list cannot be consulted
    pub failure_policy: FailurePolicy,
    pub key_prefix: String,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RevocationBackend::Memory,
            lookup_timeout_ms: 50,
            failure_policy: FailurePolicy::FailClosed,
            key_prefix: "auth:revoked".to_string(),
        }
    }
}

impl RevocationConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Token codec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Active key set; every key listed here verifies tokens
    pub signing_keys: Vec<SigningKeyConfig>,
    /// Key used to issue new tokens (defaults to the first signing key)
    pub primary_key_id: Option<String>,
    /// Expected `iss` claim; unchecked when `None`
    pub issuer: Option<String>,
    /// Clock skew tolerance applied to `exp` and `iat` (in seconds)
    pub clock_skew_seconds: u64,
    /// Lifetime of tokens issued by this process (in minutes)
    pub token_ttl_minutes: u64,
    pub revocation: RevocationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_keys: Vec::new(),
            primary_key_id: None,
            issuer: Some("hearth".to_string()),
            clock_skew_seconds: 0,
            token_ttl_minutes: 60,
            revocation: RevocationConfig::default(),
        }
    }
}

/// Storage backend for rate limiting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStorageBackend {
    /// Shared Redis/Dragonfly store (required for multi-instance deployments)
    Redis,
    /// Process-local store (single instance, development, tests)
    #[default]
    Memory,
}

/// Behaviour when a backing store cannot be reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit and log, bounded by the fail-open ceiling
    #[default]
    FailOpen,
    /// Deny with 503
    FailClosed,
}

/// Remote store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout_seconds: u64,
    /// Upper bound on a single store round trip (in milliseconds)
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_seconds: 5,
            command_timeout_ms: 50,
        }
    }
}

impl RedisConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// One quota: `limit` requests per fixed window of `window_seconds`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaConfig {
    pub limit: u32,
    pub window_seconds: u64,
}

impl QuotaConfig {
    pub const fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }
}

/// Quota table: {tenant tier × route class → quota}
///
/// Lookup order for a tenant: `tiers[tier][class]`, then `tiers["default"][class]`,
/// then `fallback`. Anonymous traffic uses `anonymous[class]`, then `anonymous_fallback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaTableConfig {
    pub tiers: HashMap<String, HashMap<String, QuotaConfig>>,
    pub anonymous: HashMap<String, QuotaConfig>,
    pub fallback: QuotaConfig,
    pub anonymous_fallback: QuotaConfig,
}

impl Default for QuotaTableConfig {
    fn default() -> Self {
        let default_tier = HashMap::from([
            ("read".to_string(), QuotaConfig::new(300, 60)),
            ("write".to_string(), QuotaConfig::new(60, 60)),
            ("auth-attempt".to_string(), QuotaConfig::new(10, 60)),
        ]);
        let premium_tier = HashMap::from([
            ("read".to_string(), QuotaConfig::new(1200, 60)),
            ("write".to_string(), QuotaConfig::new(240, 60)),
        ]);

        Self {
            tiers: HashMap::from([
                ("default".to_string(), default_tier),
                ("premium".to_string(), premium_tier),
            ]),
            anonymous: HashMap::from([
                ("auth-attempt".to_string(), QuotaConfig::new(5, 60)),
                ("read".to_string(), QuotaConfig::new(30, 60)),
            ]),
            fallback: QuotaConfig::new(120, 60),
            anonymous_fallback: QuotaConfig::new(10, 60),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    pub storage_backend: RateLimitStorageBackend,
    /// Use the in-process store if the remote store is unreachable at startup
    pub fallback_to_memory: bool,
    /// Prefix for every counter key in the store
    pub key_prefix: String,
    pub redis: RedisConfig,
    pub failure_policy: FailurePolicy,
    /// Longest outage during which fail-open still admits (in seconds)
    pub fail_open_ceiling_seconds: u64,
    /// Retry a timed-out store call once before applying the failure policy
    pub retry_on_timeout: bool,
    /// Cleanup interval for expired in-process counters (in seconds)
    pub cleanup_interval_seconds: u64,
    pub quotas: QuotaTableConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_backend: RateLimitStorageBackend::Memory,
            fallback_to_memory: false,
            key_prefix: "ratelimit".to_string(),
            redis: RedisConfig::default(),
            failure_policy: FailurePolicy::FailOpen,
            fail_open_ceiling_seconds: 60,
            retry_on_timeout: true,
            cleanup_interval_seconds: 60,
            quotas: QuotaTableConfig::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn fail_open_ceiling(&self) -> Duration {
        Duration::from_secs(self.fail_open_ceiling_seconds)
    }
}

/// Registered tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEntryConfig {
    pub id: String,
    #[serde(default = "default_tier_name")]
    pub tier: String,
}

fn default_tier_name() -> String {
    "default".to_string()
}

/// Tenant registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantsConfig {
    pub registry: Vec<TenantEntryConfig>,
}

/// Maps requests under `path_prefix` (optionally only for `methods`) to a route class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    pub path_prefix: String,
    #[serde(default)]
    pub methods: Vec<String>,
    pub route_class: String,
}

/// Route classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Paths that skip token verification and use the anonymous bucket
    pub public_paths: Vec<String>,
    /// First matching rule wins
    pub rules: Vec<RouteRuleConfig>,
    /// Class for safe methods (GET, HEAD, OPTIONS) when no rule matches
    pub default_read_class: String,
    /// Class for every other method when no rule matches
    pub default_write_class: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            public_paths: vec!["/health".to_string(), "/api/v1/auth/login".to_string()],
            rules: vec![RouteRuleConfig {
                path_prefix: "/api/v1/auth/".to_string(),
                methods: Vec::new(),
                route_class: "auth-attempt".to_string(),
            }],
            default_read_class: "read".to_string(),
            default_write_class: "write".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.auth.validate()?;
        self.rate_limit.validate()?;
        self.tenants.validate()?;
        self.routes.validate()?;
        validation::validate_revocation_backend(&self.auth, &self.rate_limit)?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("HEARTH").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
