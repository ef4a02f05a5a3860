//! Application setup and wiring

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use hearth_core::Config;
use hearth_core::application::AdmissionPipeline;
use hearth_core::config::RevocationBackend;
use hearth_core::infrastructure::auth::{
    InMemoryRevocationList, RedisRevocationList, RevocationList, TokenCodec,
};
use hearth_core::infrastructure::clock::{Clock, SystemClock};
use hearth_core::infrastructure::{ConfiguredTenantRegistry, RateLimiterService, TenantResolver};
use hearth_gateway::{AdmissionState, RouteClassifier, create_router};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    /// For collaborators that issue or revoke tokens in-process (login)
    pub pipeline: AdmissionPipeline,
    pub shutdown_token: CancellationToken,
}

/// Periodically drop expired in-memory revocation entries
fn spawn_revocation_purge(
    list: Arc<InMemoryRevocationList>,
    every: Duration,
    shutdown_token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::debug!("Revocation purge task stopped");
                    break;
                }
                _ = interval.tick() => list.purge_expired(),
            }
        }
    });
}

async fn build_codec(
    config: &Config,
    clock: Arc<dyn Clock>,
    shutdown_token: &CancellationToken,
) -> Result<TokenCodec, Box<dyn std::error::Error + Send + Sync>> {
    let codec = TokenCodec::from_config(&config.auth, Arc::clone(&clock))?;
    let revocation = &config.auth.revocation;

    if !revocation.enabled {
        tracing::info!("Token revocation disabled");
        return Ok(codec);
    }

    let list: Arc<dyn RevocationList> = match revocation.backend {
        RevocationBackend::Memory => {
            let list = Arc::new(InMemoryRevocationList::new(clock));
            spawn_revocation_purge(
                Arc::clone(&list),
                Duration::from_secs(config.rate_limit.cleanup_interval_seconds.max(1)),
                shutdown_token.clone(),
            );
            tracing::info!("Token revocation using in-memory list");
            list
        }
        RevocationBackend::Redis => {
            let list = RedisRevocationList::connect(
                &config.rate_limit.redis,
                &revocation.key_prefix,
                clock,
            )
            .await?;
            tracing::info!("Token revocation using Redis list");
            Arc::new(list)
        }
    };

    Ok(codec.with_revocation(list, revocation.lookup_timeout(), revocation.failure_policy))
}

/// Create the application router and return an AppHandle for shutdown coordination
pub async fn create_app(
    config: Config,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    create_app_with_clock(config, SystemClock::shared()).await
}

/// `create_app` with an explicit clock
pub async fn create_app_with_clock(
    config: Config,
    clock: Arc<dyn Clock>,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    let shutdown_token = CancellationToken::new();

    let codec = Arc::new(build_codec(&config, Arc::clone(&clock), &shutdown_token).await?);

    let registry = ConfiguredTenantRegistry::from_config(&config.tenants);
    if registry.is_empty() {
        tracing::warn!("Tenant registry is empty; every authenticated request will be rejected");
    } else {
        tracing::info!(tenants = registry.len(), "Tenant registry loaded");
    }
    let resolver = TenantResolver::new(Arc::new(registry));

    let limiter =
        Arc::new(RateLimiterService::new(config.rate_limit.clone(), Arc::clone(&clock)).await?);
    tracing::info!(
        enabled = limiter.is_enabled(),
        backend = %limiter.backend(),
        failure_policy = ?config.rate_limit.failure_policy,
        "Rate limiter initialized"
    );
    Arc::clone(&limiter).start_cleanup_task(shutdown_token.clone());

    let pipeline = AdmissionPipeline::new(codec, resolver, limiter);
    let state = Arc::new(AdmissionState::new(
        pipeline.clone(),
        RouteClassifier::from_config(&config.routes),
        config.server.trust_forwarded_headers,
    ));

    let router = create_router(state, Router::new());

    Ok(AppHandle {
        router,
        pipeline,
        shutdown_token,
    })
}
