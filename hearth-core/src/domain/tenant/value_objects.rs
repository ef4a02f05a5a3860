//! Tenant value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant (household) identifier carried in the `tid` claim
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing tier of a tenant; selects a row of the quota table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantTier(String);

impl TenantTier {
    /// Tier used when a tenant has no explicit tier, and as the quota fallback row
    pub const DEFAULT: &'static str = "default";

    pub fn new(tier: impl Into<String>) -> Self {
        Self(tier.into())
    }

    pub fn default_tier() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantTier {
    fn default() -> Self {
        Self::default_tier()
    }
}

impl fmt::Display for TenantTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tenant as known to the active tenant registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub id: TenantId,
    pub tier: TenantTier,
}

/// Namespace under which rate-limit counters live
///
/// `Anonymous` is a distinct variant rather than a reserved tenant id, so no
/// tenant name can ever alias the unauthenticated bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    Tenant(TenantId),
    Anonymous,
}

impl Partition {
    /// Short tag written into store keys
    pub fn tag(&self) -> &'static str {
        match self {
            Partition::Tenant(_) => "t",
            Partition::Anonymous => "a",
        }
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Partition::Tenant(id) => Some(id),
            Partition::Anonymous => None,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Tenant(id) => write!(f, "tenant:{}", id),
            Partition::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// Resolved tenant: the partition that namespaces its counters and the tier
/// that selects its quotas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantKey {
    pub partition: Partition,
    pub tier: TenantTier,
}

impl TenantKey {
    pub fn for_tenant(record: TenantRecord) -> Self {
        Self {
            partition: Partition::Tenant(record.id),
            tier: record.tier,
        }
    }

    /// Key used for unauthenticated traffic
    pub fn anonymous() -> Self {
        Self {
            partition: Partition::Anonymous,
            tier: TenantTier::default_tier(),
        }
    }
}
