//! Rate Limiter Service
//!
//! Turns a (tenant, identity, route class) triple into an allow/deny decision
//! using fixed-window counters in the configured store. The only state held
//! here is the outage tracker; all counting state lives in the store.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::degradation::{DegradationGuard, DegradationSnapshot, DegradedOutcome};
use super::quotas::QuotaTable;
use super::storage::{
    InMemoryRateLimitStorage, RateLimitStorage, RedisRateLimitStorage, StorageBackend, StoreError,
};
use super::types::{
    CounterState, IdentityBucket, Quota, RateLimitDecision, RateLimitKey, RouteClass,
    retry_after_secs,
};
use crate::config::{RateLimitConfig, RateLimitStorageBackend};
use crate::domain::tenant::TenantKey;
use crate::infrastructure::clock::Clock;

/// Rate limiter failure surfaced to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The store failed and the failure policy denies
    #[error("rate limit store unavailable")]
    StoreUnavailable(#[source] StoreError),
}

/// Main rate limiter service
pub struct RateLimiterService {
    storage: Arc<dyn RateLimitStorage>,
    quotas: QuotaTable,
    guard: DegradationGuard,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiterService {
    /// Build the service with the backend selected in configuration
    pub async fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let storage: Arc<dyn RateLimitStorage> = match config.storage_backend {
            RateLimitStorageBackend::Redis => {
                match RedisRateLimitStorage::connect(&config.redis).await {
                    Ok(storage) => {
                        info!("Rate limiter using Redis storage backend");
                        Arc::new(storage)
                    }
                    Err(e) if config.fallback_to_memory => {
                        warn!(
                            "Failed to connect to Redis for rate limiting, falling back to in-memory: {}",
                            e
                        );
                        Arc::new(InMemoryRateLimitStorage::new(Arc::clone(&clock)))
                    }
                    Err(e) => return Err(e),
                }
            }
            RateLimitStorageBackend::Memory => {
                info!("Rate limiter using in-memory storage backend");
                Arc::new(InMemoryRateLimitStorage::new(Arc::clone(&clock)))
            }
        };

        Ok(Self::with_storage(storage, config, clock))
    }

    /// Create with an explicit storage backend
    pub fn with_storage(
        storage: Arc<dyn RateLimitStorage>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let guard = DegradationGuard::new(
            config.failure_policy,
            config.fail_open_ceiling(),
            Arc::clone(&clock),
        );

        Self {
            storage,
            quotas: QuotaTable::from_config(&config.quotas),
            guard,
            clock,
            config,
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn backend(&self) -> StorageBackend {
        self.storage.backend()
    }

    /// Count one request against the current window and decide
    ///
    /// Returns `Err` only when the store failed and the failure policy denies.
    pub async fn check(
        &self,
        tenant: &TenantKey,
        identity: &IdentityBucket,
        route_class: &RouteClass,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let quota = self.quotas.quota_for(tenant, route_class);
        let now_ms = self.clock.now().timestamp_millis();
        let window_index = quota.window_index(now_ms.div_euclid(1000));
        let reset_at = quota.window_end(window_index);

        if !self.config.enabled {
            return Ok(RateLimitDecision::allowed(quota.limit, quota.limit, reset_at));
        }

        let key = RateLimitKey::new(
            tenant.partition.clone(),
            identity.clone(),
            route_class.clone(),
            window_index,
        );
        let store_key = key.to_store_key(&self.config.key_prefix);

        match self.increment(&store_key, quota).await {
            Ok(state) => {
                self.guard.record_success();
                let decision = if state.allowed {
                    let remaining = u64::from(quota.limit).saturating_sub(state.count);
                    RateLimitDecision::allowed(
                        quota.limit,
                        u32::try_from(remaining).unwrap_or(0),
                        reset_at,
                    )
                } else {
                    RateLimitDecision::denied(
                        quota.limit,
                        reset_at,
                        retry_after_secs(now_ms, reset_at),
                    )
                };
                debug!(
                    partition = %tenant.partition,
                    route_class = %route_class,
                    count = state.count,
                    limit = quota.limit,
                    allowed = decision.allowed,
                    "Rate limit checked"
                );
                Ok(decision)
            }
            Err(err) => match self.guard.record_failure(&err) {
                DegradedOutcome::Admit => Ok(RateLimitDecision::degraded(quota.limit, reset_at)),
                DegradedOutcome::Deny => Err(RateLimitError::StoreUnavailable(err)),
            },
        }
    }

    async fn increment(&self, key: &str, quota: Quota) -> Result<CounterState, StoreError> {
        let window = Duration::from_secs(quota.window_secs().unsigned_abs());
        match self
            .storage
            .increment_and_check(key, window, quota.limit)
            .await
        {
            Err(err) if err.is_timeout() && self.config.retry_on_timeout => {
                debug!(error = %err, "Rate limit store timed out, retrying once");
                self.storage
                    .increment_and_check(key, window, quota.limit)
                    .await
            }
            other => other,
        }
    }

    fn current_key(
        &self,
        tenant: &TenantKey,
        identity: &IdentityBucket,
        route_class: &RouteClass,
    ) -> String {
        let quota = self.quotas.quota_for(tenant, route_class);
        let window_index = quota.window_index(self.clock.now_secs());
        RateLimitKey::new(
            tenant.partition.clone(),
            identity.clone(),
            route_class.clone(),
            window_index,
        )
        .to_store_key(&self.config.key_prefix)
    }

    /// Administrative reset of the current window's counter
    pub async fn reset(
        &self,
        tenant: &TenantKey,
        identity: &IdentityBucket,
        route_class: &RouteClass,
    ) -> Result<(), StoreError> {
        let key = self.current_key(tenant, identity, route_class);
        self.storage.reset(&key).await?;
        info!(partition = %tenant.partition, route_class = %route_class, "Rate limit counter reset");
        Ok(())
    }

    /// Remaining TTL of the current window's counter
    pub async fn remaining_ttl(
        &self,
        tenant: &TenantKey,
        identity: &IdentityBucket,
        route_class: &RouteClass,
    ) -> Result<Option<Duration>, StoreError> {
        let key = self.current_key(tenant, identity, route_class);
        self.storage.ttl(&key).await
    }

    pub fn degradation(&self) -> DegradationSnapshot {
        self.guard.snapshot()
    }

    /// Periodically purge expired counters until `shutdown` is cancelled
    pub fn start_cleanup_task(self: Arc<Self>, shutdown: CancellationToken) {
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut interval = interval(cleanup_interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Rate limiter cleanup task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.storage.cleanup().await;
                    }
                }
            }
        });
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, QuotaConfig, QuotaTableConfig};
    use crate::domain::auth::SubjectId;
    use crate::domain::tenant::{TenantId, TenantRecord, TenantTier};
    use crate::infrastructure::clock::ManualClock;
    use std::collections::HashMap;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            quotas: QuotaTableConfig {
                tiers: HashMap::from([(
                    "default".to_string(),
                    HashMap::from([("write".to_string(), QuotaConfig::new(3, 60))]),
                )]),
                anonymous: HashMap::from([("read".to_string(), QuotaConfig::new(2, 60))]),
                fallback: QuotaConfig::new(10, 60),
                anonymous_fallback: QuotaConfig::new(1, 60),
            },
            ..RateLimitConfig::default()
        }
    }

    fn service(config: RateLimitConfig) -> (RateLimiterService, ManualClock) {
        // Start on a window boundary
        let clock = ManualClock::at_secs(1_800_000_000 - 1_800_000_000 % 60);
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let storage = Arc::new(InMemoryRateLimitStorage::new(Arc::clone(&clock_arc)));
        (
            RateLimiterService::with_storage(storage, config, clock_arc),
            clock,
        )
    }

    fn acme() -> TenantKey {
        TenantKey::for_tenant(TenantRecord {
            id: TenantId::new("acme"),
            tier: TenantTier::default_tier(),
        })
    }

    fn subject(id: &str) -> IdentityBucket {
        IdentityBucket::Subject(SubjectId::new(id))
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let mut config = test_config();
        config.enabled = false;
        let (service, _clock) = service(config);

        for _ in 0..10 {
            let decision = service
                .check(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap();
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn test_denies_after_limit() {
        let (service, _clock) = service(test_config());

        for expected_remaining in [2, 1, 0] {
            let decision = service
                .check(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = service
            .check(&acme(), &subject("u1"), &RouteClass::write())
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(60));
    }

    #[tokio::test]
    async fn test_next_window_starts_fresh() {
        let (service, clock) = service(test_config());

        for _ in 0..4 {
            service
                .check(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap();
        }
        clock.advance_secs(60);

        let decision = service
            .check(&acme(), &subject("u1"), &RouteClass::write())
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_route_classes_are_counted_separately() {
        let (service, _clock) = service(test_config());

        for _ in 0..3 {
            service
                .check(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap();
        }
        let decision = service
            .check(&acme(), &subject("u1"), &RouteClass::read())
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 10);
    }

    #[tokio::test]
    async fn test_anonymous_uses_anonymous_quota() {
        let (service, _clock) = service(test_config());
        let anon = TenantKey::anonymous();
        let addr = IdentityBucket::SourceAddr("203.0.113.9".to_string());

        assert!(service.check(&anon, &addr, &RouteClass::read()).await.unwrap().allowed);
        assert!(service.check(&anon, &addr, &RouteClass::read()).await.unwrap().allowed);
        assert!(!service.check(&anon, &addr, &RouteClass::read()).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_current_window() {
        let (service, _clock) = service(test_config());

        for _ in 0..4 {
            service
                .check(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap();
        }
        assert!(
            service
                .remaining_ttl(&acme(), &subject("u1"), &RouteClass::write())
                .await
                .unwrap()
                .is_some()
        );

        service
            .reset(&acme(), &subject("u1"), &RouteClass::write())
            .await
            .unwrap();

        let decision = service
            .check(&acme(), &subject("u1"), &RouteClass::write())
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_cancel() {
        let (service, _clock) = service(test_config());
        let service = Arc::new(service);
        let token = CancellationToken::new();

        Arc::clone(&service).start_cleanup_task(token.clone());
        token.cancel();
        tokio::task::yield_now().await;

        assert_eq!(service.degradation().policy, FailurePolicy::FailOpen);
    }
}
