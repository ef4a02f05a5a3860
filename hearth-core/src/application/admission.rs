//! Request admission pipeline
//!
//! `Received → TokenExtracted → TokenVerified → TenantResolved →
//! RateLimitChecked → Admitted`, with an early exit at each stage.
//! Authentication always precedes rate-limit accounting, so rejected
//! credentials never consume a tenant's quota.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::errors::AdmissionRejection;
use crate::domain::auth::Identity;
use crate::domain::tenant::TenantKey;
use crate::infrastructure::auth::TokenCodec;
use crate::infrastructure::rate_limiter::{
    IdentityBucket, RateLimitDecision, RateLimiterService, RouteClass,
};
use crate::infrastructure::tenant::TenantResolver;

/// Pipeline stage, recorded on rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    Received,
    TokenExtracted,
    TokenVerified,
    TenantResolved,
    RateLimitChecked,
}

impl fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdmissionStage::Received => "received",
            AdmissionStage::TokenExtracted => "token_extracted",
            AdmissionStage::TokenVerified => "token_verified",
            AdmissionStage::TenantResolved => "tenant_resolved",
            AdmissionStage::RateLimitChecked => "rate_limit_checked",
        };
        f.write_str(name)
    }
}

/// What the transport layer knows about a request
#[derive(Debug, Clone)]
pub struct AdmissionRequest<'a> {
    /// Raw `Authorization` header value
    pub authorization: Option<&'a str>,
    /// Source address for the anonymous bucket
    pub source_addr: &'a str,
    pub route_class: RouteClass,
    /// Public routes bypass the codec and use the anonymous bucket
    pub public: bool,
}

/// An admitted request
#[derive(Debug, Clone)]
pub struct Admission {
    /// `None` on public routes
    pub identity: Option<Identity>,
    pub tenant: TenantKey,
    pub decision: RateLimitDecision,
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Runs token verification, tenant resolution and rate limiting for one request
#[derive(Clone)]
pub struct AdmissionPipeline {
    codec: Arc<TokenCodec>,
    resolver: TenantResolver,
    limiter: Arc<RateLimiterService>,
}

impl AdmissionPipeline {
    pub fn new(
        codec: Arc<TokenCodec>,
        resolver: TenantResolver,
        limiter: Arc<RateLimiterService>,
    ) -> Self {
        Self {
            codec,
            resolver,
            limiter,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn limiter(&self) -> &Arc<RateLimiterService> {
        &self.limiter
    }

    pub async fn admit(
        &self,
        request: AdmissionRequest<'_>,
    ) -> Result<Admission, AdmissionRejection> {
        if request.public {
            return self.admit_anonymous(&request).await;
        }

        let mut stage = AdmissionStage::Received;
        let outcome = self.admit_authenticated(&request, &mut stage).await;

        if let Err(rejection) = &outcome {
            if rejection.is_caller_fault() {
                warn!(
                    stage = %stage,
                    kind = rejection.kind(),
                    route_class = %request.route_class,
                    "Request rejected"
                );
            } else {
                warn!(stage = %stage, kind = rejection.kind(), "Request rejected by infrastructure failure");
            }
        }
        outcome
    }

    async fn admit_authenticated(
        &self,
        request: &AdmissionRequest<'_>,
        stage: &mut AdmissionStage,
    ) -> Result<Admission, AdmissionRejection> {
        let token = request
            .authorization
            .and_then(parse_bearer)
            .ok_or(AdmissionRejection::MissingToken)?;
        *stage = AdmissionStage::TokenExtracted;

        let identity = self.codec.verify(token).await?;
        *stage = AdmissionStage::TokenVerified;

        let tenant = self.resolver.resolve(&identity)?;
        *stage = AdmissionStage::TenantResolved;

        let bucket = IdentityBucket::Subject(identity.subject.clone());
        let decision = self
            .limiter
            .check(&tenant, &bucket, &request.route_class)
            .await?;
        *stage = AdmissionStage::RateLimitChecked;

        if let Some(retry_after) = decision.retry_after.filter(|_| !decision.allowed) {
            return Err(AdmissionRejection::RateLimited {
                retry_after,
                limit: decision.limit,
                reset_at: decision.reset_at,
            });
        }

        debug!(
            subject = %identity.subject,
            tenant = %identity.tenant,
            route_class = %request.route_class,
            remaining = decision.remaining,
            "Request admitted"
        );

        Ok(Admission {
            identity: Some(identity),
            tenant,
            decision,
        })
    }

    async fn admit_anonymous(
        &self,
        request: &AdmissionRequest<'_>,
    ) -> Result<Admission, AdmissionRejection> {
        let tenant = TenantKey::anonymous();
        let bucket = IdentityBucket::SourceAddr(request.source_addr.to_string());

        let decision = self
            .limiter
            .check(&tenant, &bucket, &request.route_class)
            .await
            .map_err(|e| {
                warn!(kind = "store_unavailable", "Anonymous request rejected: {}", e);
                AdmissionRejection::from(e)
            })?;

        if let Some(retry_after) = decision.retry_after.filter(|_| !decision.allowed) {
            warn!(
                source = request.source_addr,
                route_class = %request.route_class,
                "Anonymous request rate limited"
            );
            return Err(AdmissionRejection::RateLimited {
                retry_after,
                limit: decision.limit,
                reset_at: decision.reset_at,
            });
        }

        Ok(Admission {
            identity: None,
            tenant,
            decision,
        })
    }
}
