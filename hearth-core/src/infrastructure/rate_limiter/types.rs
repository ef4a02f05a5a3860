//! Rate limiter types and core data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::QuotaConfig;
use crate::domain::auth::SubjectId;
use crate::domain::tenant::Partition;

/// Coarse route category used for quota lookup (`read`, `write`, `auth-attempt`...)
///
/// Never an exact path, so the number of counters per identity stays bounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteClass(String);

impl RouteClass {
    pub const READ: &'static str = "read";
    pub const WRITE: &'static str = "write";
    pub const AUTH_ATTEMPT: &'static str = "auth-attempt";

    pub fn new(class: impl Into<String>) -> Self {
        Self(class.into())
    }

    pub fn read() -> Self {
        Self::new(Self::READ)
    }

    pub fn write() -> Self {
        Self::new(Self::WRITE)
    }

    pub fn auth_attempt() -> Self {
        Self::new(Self::AUTH_ATTEMPT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a counter belongs to inside a partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityBucket {
    /// Authenticated subject
    Subject(SubjectId),
    /// Unauthenticated caller, keyed by source address
    SourceAddr(String),
}

impl IdentityBucket {
    fn tag(&self) -> &'static str {
        match self {
            IdentityBucket::Subject(_) => "s",
            IdentityBucket::SourceAddr(_) => "ip",
        }
    }

    fn value(&self) -> &str {
        match self {
            IdentityBucket::Subject(id) => id.as_str(),
            IdentityBucket::SourceAddr(addr) => addr,
        }
    }
}

/// Composite key identifying exactly one counter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub partition: Partition,
    pub identity: IdentityBucket,
    pub route_class: RouteClass,
    pub window_index: i64,
}

impl RateLimitKey {
    pub fn new(
        partition: Partition,
        identity: IdentityBucket,
        route_class: RouteClass,
        window_index: i64,
    ) -> Self {
        Self {
            partition,
            identity,
            route_class,
            window_index,
        }
    }

    /// Render the store key
    ///
    /// Every free-form component is written as `<len>.<bytes>`, so the
    /// rendering is injective regardless of the characters tenants, subjects
    /// or route classes contain.
    pub fn to_store_key(&self, prefix: &str) -> String {
        let mut key = String::with_capacity(prefix.len() + 64);
        key.push_str(prefix);
        key.push(':');

        key.push_str(self.partition.tag());
        if let Some(tenant) = self.partition.tenant() {
            push_component(&mut key, tenant.as_str());
        }
        key.push(':');

        key.push_str(self.identity.tag());
        push_component(&mut key, self.identity.value());
        key.push(':');

        push_component(&mut key, self.route_class.as_str());
        key.push(':');

        key.push_str(&self.window_index.to_string());
        key
    }
}

fn push_component(key: &mut String, value: &str) {
    key.push_str(&value.len().to_string());
    key.push('.');
    key.push_str(value);
}

/// A limit over a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Window length in whole seconds, never zero
    pub fn window_secs(&self) -> i64 {
        i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX).max(1)
    }

    /// Index of the fixed window containing `now_secs`
    pub fn window_index(&self, now_secs: i64) -> i64 {
        now_secs.div_euclid(self.window_secs())
    }

    /// Unix second at which window `index` ends
    pub fn window_end(&self, index: i64) -> i64 {
        index.saturating_add(1).saturating_mul(self.window_secs())
    }
}

impl From<QuotaConfig> for Quota {
    fn from(config: QuotaConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_seconds))
    }
}

/// Counter state returned by a store increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Count immediately after this caller's increment
    pub count: u64,
    /// `count <= limit`
    pub allowed: bool,
}

impl CounterState {
    pub fn new(count: u64, limit: u32) -> Self {
        Self {
            count,
            allowed: count <= u64::from(limit),
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Maximum requests allowed in the current window
    pub limit: u32,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Unix timestamp when the current window ends
    pub reset_at: i64,
    /// Seconds until the next window (only set when denied)
    pub retry_after: Option<u64>,
    /// Admitted without counting because the store failed (fail-open)
    pub degraded: bool,
}

impl RateLimitDecision {
    pub fn allowed(limit: u32, remaining: u32, reset_at: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after: None,
            degraded: false,
        }
    }

    pub fn denied(limit: u32, reset_at: i64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after),
            degraded: false,
        }
    }

    /// Admission that bypassed counting
    pub fn degraded(limit: u32, reset_at: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at,
            retry_after: None,
            degraded: true,
        }
    }
}

/// Seconds from `now_millis` to the window boundary `end_secs`, rounded up, at least 1
pub fn retry_after_secs(now_millis: i64, end_secs: i64) -> u64 {
    let remaining_ms = end_secs.saturating_mul(1000).saturating_sub(now_millis);
    let secs = (remaining_ms + 999).div_euclid(1000);
    u64::try_from(secs).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::TenantId;

    fn key(tenant: &str, subject: &str, class: &str) -> RateLimitKey {
        RateLimitKey::new(
            Partition::Tenant(TenantId::new(tenant)),
            IdentityBucket::Subject(SubjectId::new(subject)),
            RouteClass::new(class),
            7,
        )
    }

    #[test]
    fn test_store_key_format() {
        assert_eq!(
            key("acme", "u1", "write").to_store_key("ratelimit"),
            "ratelimit:t4.acme:s2.u1:5.write:7"
        );

        let anon = RateLimitKey::new(
            Partition::Anonymous,
            IdentityBucket::SourceAddr("10.0.0.1".to_string()),
            RouteClass::auth_attempt(),
            0,
        );
        assert_eq!(
            anon.to_store_key("rl"),
            "rl:a:ip8.10.0.0.1:12.auth-attempt:0"
        );
    }

    #[test]
    fn test_separator_characters_do_not_collide() {
        let a = key("a:s1.b", "c", "read");
        let b = key("a", "b:s1.c", "read");
        assert_ne!(a.to_store_key("p"), b.to_store_key("p"));
    }

    #[test]
    fn test_tenant_named_anonymous_is_distinct() {
        let tenant = RateLimitKey::new(
            Partition::Tenant(TenantId::new("anonymous")),
            IdentityBucket::SourceAddr("1.2.3.4".to_string()),
            RouteClass::read(),
            1,
        );
        let anon = RateLimitKey::new(
            Partition::Anonymous,
            IdentityBucket::SourceAddr("1.2.3.4".to_string()),
            RouteClass::read(),
            1,
        );
        assert_ne!(tenant.to_store_key("p"), anon.to_store_key("p"));
    }

    #[test]
    fn test_window_arithmetic() {
        let quota = Quota::new(5, Duration::from_secs(60));
        assert_eq!(quota.window_index(119), 1);
        assert_eq!(quota.window_index(120), 2);
        assert_eq!(quota.window_end(1), 120);
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let quota = Quota::new(5, Duration::ZERO);
        assert_eq!(quota.window_secs(), 1);
        assert_eq!(quota.window_index(10), 10);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(110_000, 120), 10);
        assert_eq!(retry_after_secs(110_001, 120), 10);
        assert_eq!(retry_after_secs(109_999, 120), 11);
        assert_eq!(retry_after_secs(119_999, 120), 1);
        // Boundary already reached: still at least one second
        assert_eq!(retry_after_secs(120_000, 120), 1);
    }

    #[test]
    fn test_counter_state_allowed() {
        assert!(CounterState::new(5, 5).allowed);
        assert!(!CounterState::new(6, 5).allowed);
    }

    #[test]
    fn test_decision_constructors() {
        let allowed = RateLimitDecision::allowed(100, 50, 1_234_567_890);
        assert!(allowed.allowed);
        assert!(allowed.retry_after.is_none());

        let denied = RateLimitDecision::denied(100, 1_234_567_890, 60);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(60));

        assert!(RateLimitDecision::degraded(10, 0).degraded);
    }
}
