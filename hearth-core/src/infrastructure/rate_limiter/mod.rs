//! Rate Limiting Infrastructure
//!
//! - Fixed-window counters keyed by (tenant partition, identity, route class, window)
//! - Quota table by tenant tier and route class, with a separate anonymous table
//! - Redis/Dragonfly storage for multi-instance deployments, sharded in-memory storage otherwise
//! - Fail-open/fail-closed policy with a staleness ceiling when the store is down

pub mod degradation;
pub mod quotas;
pub mod service;
pub mod storage;
pub mod types;

pub use degradation::{DegradationGuard, DegradationSnapshot, DegradedOutcome};
pub use quotas::QuotaTable;
pub use service::{RateLimitError, RateLimiterService};
pub use storage::{
    InMemoryRateLimitStorage, RateLimitStorage, RedisRateLimitStorage, StorageBackend, StoreError,
};
pub use types::{
    CounterState, IdentityBucket, Quota, RateLimitDecision, RateLimitKey, RouteClass,
};
