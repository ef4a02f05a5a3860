//! Common test utilities for hearth-gateway
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
    routing::post,
};
use jsonwebtoken::Algorithm;
use serde_json::Value;

use hearth_core::application::AdmissionPipeline;
use hearth_core::config::{
    AuthConfig, FailurePolicy, QuotaConfig, QuotaTableConfig, RateLimitConfig, RouteConfig,
    SigningKeyConfig,
};
use hearth_core::domain::auth::{Role, SubjectId};
use hearth_core::domain::tenant::TenantId;
use hearth_core::infrastructure::auth::InMemoryRevocationList;
use hearth_core::infrastructure::clock::{Clock, ManualClock};
use hearth_core::infrastructure::rate_limiter::{
    CounterState, InMemoryRateLimitStorage, RateLimitStorage, StorageBackend, StoreError,
};
use hearth_core::infrastructure::{
    ConfiguredTenantRegistry, RateLimiterService, TenantResolver, TokenCodec,
};
use hearth_gateway::{AdmissionState, RouteClassifier, create_router};

pub const SECRET: &str = "gateway-test-secret-0123456789abcdef";
pub const WINDOW_START: i64 = 1_800_000_000 - 1_800_000_000 % 60;
pub const TRUST_FORWARDED_HEADERS: bool = true;

/// Store that always reports the backend as down
pub struct DownStorage;

#[async_trait]
impl RateLimitStorage for DownStorage {
    async fn increment_and_check(
        &self,
        _key: &str,
        _window: Duration,
        _limit: u32,
    ) -> Result<CounterState, StoreError> {
        Err(StoreError::Unavailable(
            "Connection refused (os error 111) at 10.0.0.12:6379".to_string(),
        ))
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Err(StoreError::Unavailable("down".to_string()))
    }

    async fn reset(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("down".to_string()))
    }

    async fn cleanup(&self) {}

    fn backend(&self) -> StorageBackend {
        StorageBackend::Redis
    }
}

pub struct TestApp {
    pub router: Router,
    pub codec: Arc<TokenCodec>,
    pub clock: ManualClock,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = ManualClock::at_secs(WINDOW_START);
        let storage = Arc::new(InMemoryRateLimitStorage::new(Arc::new(clock.clone())));
        Self::with_storage(clock, storage, FailurePolicy::FailOpen)
    }

    pub fn with_storage(
        clock: ManualClock,
        storage: Arc<dyn RateLimitStorage>,
        failure_policy: FailurePolicy,
    ) -> Self {
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());

        let auth = AuthConfig {
            signing_keys: vec![SigningKeyConfig::hmac("k1", Algorithm::HS256, SECRET)],
            ..AuthConfig::default()
        };
        let codec = Arc::new(
            TokenCodec::from_config(&auth, shared.clone())
                .unwrap()
                .with_revocation(
                    Arc::new(InMemoryRevocationList::new(shared.clone())),
                    Duration::from_millis(50),
                    FailurePolicy::FailClosed,
                ),
        );

        let rate_limit = RateLimitConfig {
            failure_policy,
            quotas: QuotaTableConfig {
                tiers: HashMap::from([(
                    "default".to_string(),
                    HashMap::from([
                        ("write".to_string(), QuotaConfig::new(5, 60)),
                        ("read".to_string(), QuotaConfig::new(100, 60)),
                    ]),
                )]),
                anonymous: HashMap::from([
                    ("auth-attempt".to_string(), QuotaConfig::new(3, 60)),
                    ("read".to_string(), QuotaConfig::new(50, 60)),
                ]),
                ..QuotaTableConfig::default()
            },
            ..RateLimitConfig::default()
        };
        let limiter = Arc::new(RateLimiterService::with_storage(
            storage,
            rate_limit,
            shared.clone(),
        ));

        let registry = ConfiguredTenantRegistry::from_pairs([("acme", "default"), ("globex", "default")]);
        let pipeline =
            AdmissionPipeline::new(codec.clone(), TenantResolver::new(Arc::new(registry)), limiter);

        let state = Arc::new(AdmissionState::new(
            pipeline,
            RouteClassifier::from_config(&RouteConfig::default()),
            // Callers are addressed through X-Forwarded-For, as behind a proxy
            TRUST_FORWARDED_HEADERS,
        ));

        let api = Router::new()
            .route(
                "/api/v1/pantry",
                post(|| async { StatusCode::CREATED }).get(|| async { "[]" }),
            )
            .route("/api/v1/auth/login", post(|| async { "issued" }));

        Self {
            router: create_router(state, api),
            codec,
            clock,
        }
    }

    pub fn bearer(&self, subject: &str, tenant: &str) -> String {
        let token = self
            .codec
            .issue(&SubjectId::new(subject), &TenantId::new(tenant), Role::Member, None)
            .unwrap();
        format!("Bearer {}", token)
    }
}

pub fn request(method: &str, uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn from_addr(method: &str, uri: &str, addr: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", addr)
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
