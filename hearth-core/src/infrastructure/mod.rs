//! Infrastructure Layer - External concerns and implementations
//!
//! Token codec, revocation lists, tenant registry, clock and rate limit stores.

pub mod auth;
pub mod clock;
pub mod rate_limiter;
pub mod tenant;

pub use auth::{TokenCodec, RevocationList};
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limiter::{RateLimitStorage, RateLimiterService};
pub use tenant::{ConfiguredTenantRegistry, TenantResolver};
