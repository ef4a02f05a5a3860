//! Token revocation list
//!
//! Two forms of revocation, both keyed so entries expire on their own:
//! a single token by `jti`, and every token of a subject issued before a
//! revocation instant ("log out everywhere"). Subject entries are scoped to
//! a tenant; the same subject id under another tenant is a different caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RedisConfig;
use crate::domain::auth::{SubjectId, TokenId};
use crate::domain::tenant::TenantId;
use crate::infrastructure::clock::Clock;

/// Failure to read or write the revocation list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevocationError {
    #[error("revocation list unavailable: {0}")]
    Unavailable(String),
}

/// Revocation list port
#[async_trait]
pub trait RevocationList: Send + Sync {
    /// Revoke a single token; `ttl` should cover the token's remaining lifetime
    async fn revoke_token(&self, token_id: &TokenId, ttl: Duration)
    -> Result<(), RevocationError>;

    async fn is_revoked(&self, token_id: &TokenId) -> Result<bool, RevocationError>;

    /// Revoke every token of `subject` within `tenant` issued before `revoked_at`
    async fn revoke_all_for_subject(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), RevocationError>;

    /// Whether a token of `subject` issued at `token_iat` falls under a subject-wide revocation
    async fn is_subject_revoked(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        token_iat: i64,
    ) -> Result<bool, RevocationError>;
}

/// `<len>.<tenant>:<subject>`; the length prefix keeps the pair unambiguous
fn subject_component(tenant: &TenantId, subject: &SubjectId) -> String {
    let tenant = tenant.as_str();
    format!("{}.{}:{}", tenant.len(), tenant, subject)
}

#[derive(Debug, Clone, Copy)]
struct RevocationEntry {
    revoked_at: i64,
    expires_at_ms: i64,
}

/// Process-local revocation list
pub struct InMemoryRevocationList {
    tokens: DashMap<String, RevocationEntry>,
    subjects: DashMap<String, RevocationEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationList {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: DashMap::new(),
            subjects: DashMap::new(),
            clock,
        }
    }

    fn entry(&self, revoked_at: i64, ttl: Duration) -> RevocationEntry {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        RevocationEntry {
            revoked_at,
            expires_at_ms: self.clock.now().timestamp_millis().saturating_add(ttl_ms),
        }
    }

    fn live(&self, entry: &RevocationEntry) -> bool {
        self.clock.now().timestamp_millis() < entry.expires_at_ms
    }

    /// Drop expired entries
    pub fn purge_expired(&self) {
        let now_ms = self.clock.now().timestamp_millis();
        self.tokens.retain(|_, entry| entry.expires_at_ms > now_ms);
        self.subjects.retain(|_, entry| entry.expires_at_ms > now_ms);
    }
}

#[async_trait]
impl RevocationList for InMemoryRevocationList {
    async fn revoke_token(
        &self,
        token_id: &TokenId,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        let entry = self.entry(self.clock.now_secs(), ttl);
        self.tokens.insert(token_id.as_str().to_string(), entry);
        tracing::debug!(token_id = %token_id, "Token revoked");
        Ok(())
    }

    async fn is_revoked(&self, token_id: &TokenId) -> Result<bool, RevocationError> {
        Ok(self
            .tokens
            .get(token_id.as_str())
            .is_some_and(|entry| self.live(&entry)))
    }

    async fn revoke_all_for_subject(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        let entry = self.entry(revoked_at.timestamp(), ttl);
        self.subjects.insert(subject_component(tenant, subject), entry);
        tracing::info!(tenant = %tenant, subject = %subject, "All subject tokens revoked");
        Ok(())
    }

    async fn is_subject_revoked(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        token_iat: i64,
    ) -> Result<bool, RevocationError> {
        Ok(self
            .subjects
            .get(&subject_component(tenant, subject))
            .is_some_and(|entry| self.live(&entry) && token_iat < entry.revoked_at))
    }
}

/// Redis-backed revocation list shared across instances
pub struct RedisRevocationList {
    connection_manager: ConnectionManager,
    key_prefix: String,
    command_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisRevocationList {
    pub async fn connect(
        config: &RedisConfig,
        key_prefix: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RevocationError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RevocationError::Unavailable(e.to_string()))?;

        let connection_manager =
            match tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
                .await
            {
                Ok(Ok(manager)) => manager,
                Ok(Err(e)) => return Err(RevocationError::Unavailable(e.to_string())),
                Err(_) => {
                    return Err(RevocationError::Unavailable(
                        "connection timed out".to_string(),
                    ));
                }
            };

        Ok(Self::from_connection(
            connection_manager,
            key_prefix,
            config.command_timeout(),
            clock,
        ))
    }

    pub fn from_connection(
        connection_manager: ConnectionManager,
        key_prefix: &str,
        command_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection_manager,
            key_prefix: key_prefix.to_string(),
            command_timeout,
            clock,
        }
    }

    /// Run one command under `command_timeout`
    async fn bounded<T>(&self, cmd: redis::Cmd) -> Result<T, RevocationError>
    where
        T: redis::FromRedisValue,
    {
        let mut conn = self.connection_manager.clone();
        match tokio::time::timeout(self.command_timeout, cmd.query_async::<T>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RevocationError::Unavailable(e.to_string())),
            Err(_) => Err(RevocationError::Unavailable(format!(
                "command timed out after {:?}",
                self.command_timeout
            ))),
        }
    }

    fn token_key(&self, token_id: &TokenId) -> String {
        format!("{}:token:{}", self.key_prefix, token_id)
    }

    fn subject_key(&self, tenant: &TenantId, subject: &SubjectId) -> String {
        format!("{}:subject:{}", self.key_prefix, subject_component(tenant, subject))
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl RevocationList for RedisRevocationList {
    async fn revoke_token(
        &self,
        token_id: &TokenId,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.token_key(token_id))
            .arg(self.clock.now_secs())
            .arg("EX")
            .arg(ttl_secs(ttl));
        self.bounded::<String>(cmd).await?;

        tracing::debug!(token_id = %token_id, "Token revoked");
        Ok(())
    }

    async fn is_revoked(&self, token_id: &TokenId) -> Result<bool, RevocationError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(self.token_key(token_id));
        let exists: i64 = self.bounded(cmd).await?;
        Ok(exists > 0)
    }

    async fn revoke_all_for_subject(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        revoked_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.subject_key(tenant, subject))
            .arg(revoked_at.timestamp())
            .arg("EX")
            .arg(ttl_secs(ttl));
        self.bounded::<String>(cmd).await?;

        tracing::info!(tenant = %tenant, subject = %subject, "All subject tokens revoked");
        Ok(())
    }

    async fn is_subject_revoked(
        &self,
        tenant: &TenantId,
        subject: &SubjectId,
        token_iat: i64,
    ) -> Result<bool, RevocationError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.subject_key(tenant, subject));
        let revoked_at: Option<i64> = self.bounded(cmd).await?;

        // Tokens issued before the revocation instant are invalid
        Ok(revoked_at.is_some_and(|revoked_at| token_iat < revoked_at))
    }
}
