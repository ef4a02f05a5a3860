//! Quota table: {tenant tier × route class → quota}

use std::collections::HashMap;

use super::types::{Quota, RouteClass};
use crate::config::QuotaTableConfig;
use crate::domain::tenant::{Partition, TenantKey, TenantTier};

#[derive(Debug, Clone)]
pub struct QuotaTable {
    tiers: HashMap<String, HashMap<String, Quota>>,
    anonymous: HashMap<String, Quota>,
    fallback: Quota,
    anonymous_fallback: Quota,
}

impl QuotaTable {
    pub fn from_config(config: &QuotaTableConfig) -> Self {
        let tiers = config
            .tiers
            .iter()
            .map(|(tier, classes)| {
                let classes = classes
                    .iter()
                    .map(|(class, quota)| (class.clone(), Quota::from(*quota)))
                    .collect();
                (tier.clone(), classes)
            })
            .collect();

        let anonymous = config
            .anonymous
            .iter()
            .map(|(class, quota)| (class.clone(), Quota::from(*quota)))
            .collect();

        Self {
            tiers,
            anonymous,
            fallback: config.fallback.into(),
            anonymous_fallback: config.anonymous_fallback.into(),
        }
    }

    /// Select the quota for a tenant and route class
    ///
    /// Tenants: tier entry, then the `default` tier entry, then the global
    /// fallback. Anonymous callers: anonymous entry, then the anonymous fallback.
    pub fn quota_for(&self, tenant: &TenantKey, route_class: &RouteClass) -> Quota {
        match tenant.partition {
            Partition::Anonymous => self
                .anonymous
                .get(route_class.as_str())
                .copied()
                .unwrap_or(self.anonymous_fallback),
            Partition::Tenant(_) => self
                .lookup(tenant.tier.as_str(), route_class)
                .or_else(|| self.lookup(TenantTier::DEFAULT, route_class))
                .unwrap_or(self.fallback),
        }
    }

    fn lookup(&self, tier: &str, route_class: &RouteClass) -> Option<Quota> {
        self.tiers
            .get(tier)
            .and_then(|classes| classes.get(route_class.as_str()))
            .copied()
    }
}
